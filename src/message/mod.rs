//! # Network messages
//!
//! Every message type implements [Message] and gets its identity from
//! [MessageIdentity], usually through [declare!](crate::declare).
//! The object-safe [NetMessage] is implemented for every [Message]
//! and lets a channel treat all message types uniformly.

use crate::{
    channel::{DispatchError, Dispatcher},
    delegate::DelegateError,
};
use std::{any::Any, fmt};

mod buffer;
mod frame;


pub use buffer::*;
pub use frame::*;

/// Integer type indexing message slots of a channel
pub type NetSlot = u16;

/// Number of distinct message identities, one per [NetSlot] value
pub const MAX_NETWORK_SLOTS: usize = 1 << NetSlot::BITS;

/// Message type identity
///
/// Unique per message type within one dispatch universe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(NetSlot);

impl MessageId {
    /// Creates an identity from its slot index
    pub const fn new(slot: NetSlot) -> Self {
        Self(slot)
    }

    /// Slot index of this identity
    pub const fn slot(self) -> NetSlot {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Compile-time association between a message type and its identity
pub trait MessageIdentity {
    /// Wire identity of the message type
    const ID: MessageId;

    /// Message name in debug messages
    ///
    /// Not stable across versions and never used on the wire
    const NAME: &'static str;
}

/// A concrete network message
///
/// `Default` provides the fresh instance that inbound payloads are decoded into
pub trait Message: MessageIdentity + Default + fmt::Debug + Send + 'static {
    /// Serializes the payload fields
    fn encode(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError>;

    /// Deserializes the payload fields
    fn decode(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError>;

    /// Whether this instance must be delivered reliably
    fn reliable(&self) -> bool {
        true
    }
}

/// Object-safe capability set shared by all messages
pub trait NetMessage: Any + Send {
    /// Wire identity
    fn get_id(&self) -> MessageId;

    /// Human-readable type name, diagnostic only
    fn name(&self) -> &'static str;

    /// Whether this instance must be delivered reliably
    fn is_reliable(&self) -> bool;

    /// Serializes self into `buffer`
    fn write(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError>;

    /// Deserializes self from `buffer`
    fn read(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError>;

    /// Hands self to `dispatcher`
    ///
    /// Fails with [DelegateError::Unbound] if the dispatcher is not valid
    fn handle(self: Box<Self>, dispatcher: &dyn Dispatcher) -> Result<bool, DispatchError>;

    /// Formats name and fields for logging, at most `capacity` bytes long
    fn string_info(&self, capacity: usize) -> String;

    #[doc(hidden)]
    fn as_any(&self) -> &dyn Any;

    #[doc(hidden)]
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<M: Message> NetMessage for M {
    fn get_id(&self) -> MessageId {
        M::ID
    }

    fn name(&self) -> &'static str {
        M::NAME
    }

    fn is_reliable(&self) -> bool {
        self.reliable()
    }

    fn write(&self, buffer: &mut WriteBuffer) -> Result<(), CodecError> {
        self.encode(buffer)
    }

    fn read(&mut self, buffer: &mut ReadBuffer<'_>) -> Result<(), CodecError> {
        self.decode(buffer)
    }

    fn handle(self: Box<Self>, dispatcher: &dyn Dispatcher) -> Result<bool, DispatchError> {
        if !dispatcher.is_valid() {
            return Err(DelegateError::Unbound.into());
        }
        dispatcher.dispatch(self)
    }

    fn string_info(&self, capacity: usize) -> String {
        let mut info = format!("{} {:?}", M::NAME, self);
        truncate_at_char_boundary(&mut info, capacity);
        info
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

impl dyn NetMessage {
    /// Returns true if the message is of type `M`
    pub fn is<M: Message>(&self) -> bool {
        self.as_any().is::<M>()
    }

    /// Returns a reference to the concrete message
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref()
    }

    /// Converts into the concrete message
    pub fn downcast<M: Message>(self: Box<Self>) -> Option<Box<M>> {
        self.into_any().downcast().ok()
    }
}

impl fmt::Debug for dyn NetMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.get_id())
    }
}

fn truncate_at_char_boundary(s: &mut String, capacity: usize) {
    if s.len() <= capacity {
        return;
    }
    let mut end = capacity;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
