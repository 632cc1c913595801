/// Default upper bound for a single payload (64 KiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Channel properties
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Largest payload accepted by the send operations
    pub max_payload_size: usize,

    /// Initial capacity requested from the allocator for an outbound frame
    ///
    /// Frames larger than this grow past it up to `max_payload_size`,
    /// values above `max_payload_size` are clamped to it
    pub frame_capacity: usize,

    /// Weight of the newest sample in the rolling throughput average,
    /// in `(0, 1]`
    pub stats_smoothing: f32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            frame_capacity: 256,
            stats_smoothing: 0.125,
        }
    }
}

impl ChannelConfig {
    /// Sets the largest accepted payload
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Sets the initial frame capacity
    pub fn with_frame_capacity(mut self, frame_capacity: usize) -> Self {
        self.frame_capacity = frame_capacity;
        self
    }

    /// Sets the throughput smoothing factor
    pub fn with_stats_smoothing(mut self, stats_smoothing: f32) -> Self {
        self.stats_smoothing = stats_smoothing;
        self
    }

    /// Checks that every field is in range
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.max_payload_size == 0 || self.max_payload_size > u32::MAX as usize {
            return Err("max_payload_size must be in 1..=u32::MAX");
        }
        if self.frame_capacity > u32::MAX as usize {
            return Err("frame_capacity must be at most u32::MAX");
        }
        if !(self.stats_smoothing > 0.0 && self.stats_smoothing <= 1.0) {
            return Err("stats_smoothing must be in (0, 1]");
        }
        Ok(())
    }
}
