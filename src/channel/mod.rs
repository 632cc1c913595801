//! # Channels
//!
//! A [Channel] owns the handler registrations of one peer connection.
//! At most one handler is registered per message identity,
//! and only the owner of a registration can remove it.

use crate::{
    delegate::Delegate,
    library::{AllocError, BufferAllocator, ChannelToken, DEFAULT_FLAGS},
    message::{
        encode_frame, CodecError, FrameError, FrameHeader, Message, MessageId, NetMessage,
        WriteBuffer, HEADER_SIZE,
    },
    transport::{Transport, TransportError},
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{any::Any, collections::HashMap, fmt, sync::Arc, time::Instant};

mod address;
mod config;
mod dispatcher;
mod stats;

#[cfg(test)]
mod test;

pub use address::*;
pub use config::*;
pub use dispatcher::*;
pub use stats::ChannelStats;

use stats::StatsRecorder;

/// Number of user data slots of a channel
pub const USERDATA_SLOTS: usize = 8;

/// Opaque annotation attached to a channel by higher layers
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Delegate type accepted by [Channel::register_message]
pub type MessageDelegate<H, M> = Delegate<H, M, bool>;

/// This enumeration is the list of the possible error outcomes for
/// [register_message](Channel::register_message) and
/// [unregister_message](Channel::unregister_message)
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// A handler is already registered for this identity
    #[error("a handler for {name} ({id}) is already registered")]
    DuplicateRegistration {
        /// Message identity
        id: MessageId,
        /// Message name
        name: &'static str,
    },
    /// No handler is registered for this identity
    #[error("no handler registered for {name} ({id})")]
    UnregisteredHandler {
        /// Message identity
        id: MessageId,
        /// Message name
        name: &'static str,
    },
    /// The registered handler differs from the one supplied
    #[error("registered handler for {name} ({id}) does not match")]
    HandlerMismatch {
        /// Message identity
        id: MessageId,
        /// Message name
        name: &'static str,
    },
    /// Table storage could not be allocated
    #[error("allocation failure")]
    AllocationFailure,
}

/// This enumeration is the list of the possible error outcomes for
/// channel send, receive and property operations
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// Payload exceeds the configured maximum
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Configured maximum
        max: usize,
    },
    /// Transport reports it cannot accept frames
    #[error("transport unavailable")]
    TransportUnavailable,
    /// Transport rejected the frame
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Message serialization failed
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Frame header is malformed
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Handler invocation failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Frame buffer could not be allocated
    #[error(transparent)]
    Allocation(#[from] AllocError),
    /// User data index out of range
    #[error("user data index {index} out of range (slots: {slots})", slots = USERDATA_SLOTS)]
    UserDataIndex {
        /// Requested index
        index: usize,
    },
    /// Channel properties are out of range
    #[error("invalid channel config: {0}")]
    InvalidConfig(&'static str),
}

/// Outcome of [Channel::receive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The registered handler ran and returned this value
    Handled(bool),
    /// No handler is registered for this identity, the message was dropped
    Dropped(MessageId),
}

/// Snapshot of channel metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    /// Peer endpoint
    pub address: NetAddress,
    /// Traffic counters
    pub stats: ChannelStats,
    /// Number of registered handlers
    pub handlers: usize,
}

/// A per-peer message channel
///
/// Created by [NetLibrary::open_channel](crate::library::NetLibrary::open_channel)
pub struct Channel {
    address: NetAddress,
    config: ChannelConfig,
    handlers: HashMap<MessageId, Box<dyn Dispatcher>>,
    userdata: [Option<UserData>; USERDATA_SLOTS],
    stats: Mutex<StatsRecorder>,
    transport: Arc<dyn Transport>,
    allocator: Arc<dyn BufferAllocator>,
    _token: ChannelToken,
}

impl Channel {
    pub(crate) fn new(
        address: NetAddress,
        config: ChannelConfig,
        transport: Arc<dyn Transport>,
        allocator: Arc<dyn BufferAllocator>,
        token: ChannelToken,
    ) -> Self {
        Self {
            address,
            stats: Mutex::new(StatsRecorder::new(config.stats_smoothing)),
            config,
            handlers: HashMap::new(),
            userdata: Default::default(),
            transport,
            allocator,
            _token: token,
        }
    }

    /// Peer endpoint
    pub fn address(&self) -> NetAddress {
        self.address
    }

    /// Changes the peer endpoint
    pub fn set_address(&mut self, address: NetAddress) {
        self.address = address;
    }

    /// Current properties
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Replaces the channel properties
    pub fn set_properties(&mut self, config: ChannelConfig) -> Result<(), ChannelError> {
        config.validate().map_err(ChannelError::InvalidConfig)?;
        self.stats.lock().set_smoothing(config.stats_smoothing);
        self.config = config;
        Ok(())
    }

    /// Traffic counters
    pub fn stats(&self) -> ChannelStats {
        self.stats.lock().snapshot()
    }

    /// Snapshot of address, counters and handler count
    pub fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            address: self.address,
            stats: self.stats(),
            handlers: self.handlers.len(),
        }
    }

    /// User data stored at `index`
    pub fn userdata(&self, index: usize) -> Result<Option<&UserData>, ChannelError> {
        self.userdata
            .get(index)
            .map(Option::as_ref)
            .ok_or(ChannelError::UserDataIndex { index })
    }

    /// User data stored at `index` if it is a `T`
    pub fn userdata_as<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        let data = self.userdata.get(index)?.as_ref()?;
        data.clone().downcast().ok()
    }

    /// Stores user data at `index`, returning the previous value
    pub fn set_userdata(
        &mut self,
        index: usize,
        data: Option<UserData>,
    ) -> Result<Option<UserData>, ChannelError> {
        let slot = self
            .userdata
            .get_mut(index)
            .ok_or(ChannelError::UserDataIndex { index })?;
        Ok(std::mem::replace(slot, data))
    }

    /// Registers `handler` for messages of type `M`
    ///
    /// Fails if a handler for `M` is already registered,
    /// the existing handler stays in place
    pub fn register_message<H, M>(
        &mut self,
        handler: MessageDelegate<H, M>,
    ) -> Result<(), RegistrationError>
    where
        H: ?Sized + Send + Sync + 'static,
        M: Message,
    {
        if self.handlers.contains_key(&M::ID) {
            tracing::debug!(id = %M::ID, name = M::NAME, "handler already registered");
            return Err(RegistrationError::DuplicateRegistration {
                id: M::ID,
                name: M::NAME,
            });
        }
        self.handlers
            .try_reserve(1)
            .map_err(|_| RegistrationError::AllocationFailure)?;
        self.handlers.insert(M::ID, Box::new(handler));
        tracing::debug!(id = %M::ID, name = M::NAME, address = %self.address, "handler registered");
        Ok(())
    }

    /// Removes the registration of `handler` for messages of type `M`
    ///
    /// Fails if nothing is registered for `M`
    /// or the registered handler is not equal to `handler`
    pub fn unregister_message<H, M>(
        &mut self,
        handler: &MessageDelegate<H, M>,
    ) -> Result<(), RegistrationError>
    where
        H: ?Sized + Send + Sync + 'static,
        M: Message,
    {
        let registered = match self.handlers.get(&M::ID) {
            Some(registered) => registered,
            None => {
                return Err(RegistrationError::UnregisteredHandler {
                    id: M::ID,
                    name: M::NAME,
                })
            }
        };
        let same = registered
            .as_any()
            .downcast_ref::<MessageDelegate<H, M>>()
            .map_or(false, |registered| registered == handler);
        if !same {
            return Err(RegistrationError::HandlerMismatch {
                id: M::ID,
                name: M::NAME,
            });
        }
        self.handlers.remove(&M::ID);
        tracing::debug!(id = %M::ID, name = M::NAME, address = %self.address, "handler unregistered");
        Ok(())
    }

    /// Returns true if a handler is registered for `id`
    pub fn is_registered(&self, id: MessageId) -> bool {
        self.handlers.contains_key(&id)
    }

    /// Number of registered handlers
    pub fn registered_count(&self) -> usize {
        self.handlers.len()
    }

    /// Sends pre-serialized bytes as they are
    pub fn send_raw(&self, data: &[u8]) -> Result<(), ChannelError> {
        self.check_size(data.len())?;
        self.transmit(Bytes::copy_from_slice(data), true)
    }

    /// Sends a complete frame (header and payload) as it is
    pub fn send_buffer(&self, frame: Bytes) -> Result<(), ChannelError> {
        let (header, _) = FrameHeader::parse(&frame)?;
        self.check_size(header.payload_len as usize)?;
        self.transmit(frame, header.reliable)
    }

    /// Serializes `message` into a frame and sends it
    ///
    /// The frame buffer goes back to the allocator if encoding or transmission fails
    pub fn send(&self, message: &dyn NetMessage) -> Result<(), ChannelError> {
        let capacity = HEADER_SIZE.saturating_add(
            self.config
                .frame_capacity
                .min(self.config.max_payload_size),
        );
        let storage = self.allocator.allocate(1, capacity, DEFAULT_FLAGS)?;
        let mut buffer = WriteBuffer::from_bytes_mut(
            storage,
            HEADER_SIZE.saturating_add(self.config.max_payload_size),
        );
        if let Err(e) = encode_frame(message, &mut buffer) {
            tracing::debug!(id = %message.get_id(), name = message.name(), error = %e, "cannot encode message");
            self.allocator.free(buffer.into_inner());
            return Err(e.into());
        }
        tracing::trace!(
            id = %message.get_id(),
            bytes = buffer.len(),
            info = %message.string_info(256),
            "sending message"
        );
        let frame = buffer.freeze();
        if let Err(e) = self.transmit(frame.clone(), message.is_reliable()) {
            tracing::debug!(id = %message.get_id(), error = %e, "cannot transmit message");
            // the transport has released its handle, so the storage is unique again
            if let Ok(storage) = frame.try_into_mut() {
                self.allocator.free(storage);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Dispatches an inbound frame to the handler registered for its identity
    ///
    /// Messages without a handler are counted in [ChannelStats::dropped]
    /// and reported as [Delivery::Dropped]
    pub fn receive(&self, frame: &[u8]) -> Result<Delivery, ChannelError> {
        let (header, payload) = FrameHeader::parse(frame)?;
        self.stats.lock().record_received(frame.len(), Instant::now());

        let dispatcher = match self.handlers.get(&header.id) {
            Some(dispatcher) => dispatcher,
            None => {
                self.stats.lock().record_dropped();
                tracing::debug!(id = %header.id, bytes = frame.len(), address = %self.address, "no handler, message dropped");
                return Ok(Delivery::Dropped(header.id));
            }
        };

        let message = dispatcher.decode(payload)?;
        let name = message.name();
        match message.handle(&**dispatcher) {
            Ok(handled) => Ok(Delivery::Handled(handled)),
            Err(e) => {
                tracing::warn!(id = %header.id, name, error = %e, "message handler failed");
                Err(e.into())
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<(), ChannelError> {
        if size > self.config.max_payload_size {
            return Err(ChannelError::PayloadTooLarge {
                size,
                max: self.config.max_payload_size,
            });
        }
        Ok(())
    }

    fn transmit(&self, frame: Bytes, reliable: bool) -> Result<(), ChannelError> {
        if !self.transport.is_available() {
            return Err(ChannelError::TransportUnavailable);
        }
        let len = frame.len();
        self.transport.transmit(frame, reliable)?;
        self.stats.lock().record_sent(len, Instant::now());
        Ok(())
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.handlers.keys().copied().collect();
        ids.sort();
        f.debug_struct("Channel")
            .field("address", &self.address)
            .field("config", &self.config)
            .field("handlers", &ids)
            .field("stats", &self.stats())
            .finish()
    }
}
