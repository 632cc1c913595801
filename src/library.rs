//! # Library lifecycle
//!
//! [NetLibrary::initialize] validates the configuration and probes the
//! injected [BufferAllocator]. Channels are opened through the library
//! and every outbound frame buffer is requested from its allocator.

use crate::{
    channel::{Channel, ChannelConfig, NetAddress},
    message::HEADER_SIZE,
    transport::Transport,
};
use bytes::BytesMut;
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Allocation flags meaning "no special requirements"
pub const DEFAULT_FLAGS: i32 = -1;

/// Buffer allocation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot allocate {count} x {size} bytes")]
pub struct AllocError {
    /// Requested element count
    pub count: usize,
    /// Requested element size
    pub size: usize,
}

/// Source of frame buffers
pub trait BufferAllocator: Send + Sync {
    /// Returns an empty buffer with room for `count * size` bytes
    fn allocate(&self, count: usize, size: usize, flags: i32) -> Result<BytesMut, AllocError>;

    /// Takes back a buffer that was not handed to a transport
    fn free(&self, buffer: BytesMut);
}

/// Allocator backed by the global allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl BufferAllocator for SystemAllocator {
    fn allocate(&self, count: usize, size: usize, _flags: i32) -> Result<BytesMut, AllocError> {
        let len = count
            .checked_mul(size)
            .filter(|len| *len <= isize::MAX as usize)
            .ok_or(AllocError { count, size })?;
        Ok(BytesMut::with_capacity(len))
    }

    fn free(&self, buffer: BytesMut) {
        drop(buffer);
    }
}

/// This enumeration is the list of the possible error outcomes for
/// [NetLibrary] operations
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// A configuration value is out of range, or the call is not allowed now
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// The allocator could not provide memory
    #[error("out of memory")]
    OutOfMemory,
}

/// Library configuration
#[derive(Clone)]
pub struct NetConfig {
    /// Allocator for frame buffers
    pub allocator: Arc<dyn BufferAllocator>,
    /// Maximum number of simultaneously open channels
    pub max_channels: usize,
    /// Properties of newly opened channels
    pub channel: ChannelConfig,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            allocator: Arc::new(SystemAllocator),
            max_channels: 1024,
            channel: ChannelConfig::default(),
        }
    }
}

impl NetConfig {
    /// Routes frame buffer allocation through `allocator`
    pub fn with_allocator(mut self, allocator: Arc<dyn BufferAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Sets the channel limit
    pub fn with_max_channels(mut self, max_channels: usize) -> Self {
        self.max_channels = max_channels;
        self
    }

    /// Sets the properties of newly opened channels
    pub fn with_channel_config(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }
}

impl fmt::Debug for NetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetConfig")
            .field("max_channels", &self.max_channels)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// An initialized network library
///
/// Channels keep working after the library is dropped,
/// [deinitialize](NetLibrary::deinitialize) refuses while any of them is open
#[derive(Debug)]
pub struct NetLibrary {
    config: NetConfig,
    channels: Arc<AtomicUsize>,
}

/// Open-channel slot held by a [Channel], released on drop
#[derive(Debug)]
pub(crate) struct ChannelToken {
    channels: Arc<AtomicUsize>,
}

impl Drop for ChannelToken {
    fn drop(&mut self) {
        self.channels.fetch_sub(1, Ordering::AcqRel);
    }
}

impl NetLibrary {
    /// Validates `config` and checks that the allocator works
    pub fn initialize(config: NetConfig) -> Result<Self, InitError> {
        if config.max_channels == 0 {
            return Err(InitError::InvalidParameter("max_channels must be positive"));
        }
        config
            .channel
            .validate()
            .map_err(InitError::InvalidParameter)?;
        let probe = config
            .allocator
            .allocate(1, HEADER_SIZE, DEFAULT_FLAGS)
            .map_err(|_| InitError::OutOfMemory)?;
        config.allocator.free(probe);
        tracing::debug!(max_channels = config.max_channels, "network library initialized");
        Ok(Self {
            config,
            channels: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Library configuration
    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Number of channels opened by this library that are still alive
    pub fn open_channels(&self) -> usize {
        self.channels.load(Ordering::Acquire)
    }

    /// Opens a channel to `address` writing frames to `transport`
    ///
    /// Safe to call from several threads, the channel limit holds across all of them
    pub fn open_channel(
        &self,
        address: NetAddress,
        transport: Arc<dyn Transport>,
    ) -> Result<Channel, InitError> {
        let max = self.config.max_channels;
        self.channels
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < max).then(|| open + 1)
            })
            .map_err(|_| InitError::InvalidParameter("channel limit reached"))?;
        let token = ChannelToken {
            channels: self.channels.clone(),
        };
        tracing::debug!(%address, "channel opened");
        Ok(Channel::new(
            address,
            self.config.channel.clone(),
            transport,
            self.config.allocator.clone(),
            token,
        ))
    }

    /// Shuts the library down
    ///
    /// Fails while channels opened by this library are still alive
    pub fn deinitialize(self) -> Result<(), InitError> {
        let open = self.open_channels();
        if open > 0 {
            tracing::warn!(open, "deinitialize with open channels");
            return Err(InitError::InvalidParameter("channels are still open"));
        }
        tracing::debug!("network library deinitialized");
        Ok(())
    }
}
