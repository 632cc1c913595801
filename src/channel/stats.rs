use std::time::Instant;

/// Traffic counters of a channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelStats {
    /// Rolling average of sent and received bytes per second
    pub avg_bytes_per_sec: f32,
    /// Frames handed to the transport
    pub messages_sent: u64,
    /// Bytes handed to the transport
    pub bytes_sent: u64,
    /// Frames passed to [receive](super::Channel::receive) with a valid header
    pub messages_received: u64,
    /// Bytes of those frames
    pub bytes_received: u64,
    /// Inbound messages without a registered handler
    pub dropped: u64,
}

#[derive(Debug)]
pub(crate) struct StatsRecorder {
    stats: ChannelStats,
    smoothing: f32,
    last_sample: Option<Instant>,
    pending_bytes: u64,
    primed: bool,
}

impl StatsRecorder {
    pub(crate) fn new(smoothing: f32) -> Self {
        Self {
            stats: ChannelStats::default(),
            smoothing,
            last_sample: None,
            pending_bytes: 0,
            primed: false,
        }
    }

    pub(crate) fn snapshot(&self) -> ChannelStats {
        self.stats
    }

    pub(crate) fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing;
    }

    pub(crate) fn record_sent(&mut self, bytes: usize, now: Instant) {
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += bytes as u64;
        self.sample(bytes, now);
    }

    pub(crate) fn record_received(&mut self, bytes: usize, now: Instant) {
        self.stats.messages_received += 1;
        self.stats.bytes_received += bytes as u64;
        self.sample(bytes, now);
    }

    pub(crate) fn record_dropped(&mut self) {
        self.stats.dropped += 1;
    }

    // bytes seen since the previous sample are averaged over the elapsed time,
    // the first sample only starts the clock
    pub(crate) fn sample(&mut self, bytes: usize, now: Instant) {
        let last = match self.last_sample {
            Some(last) => last,
            None => {
                self.last_sample = Some(now);
                return;
            }
        };
        self.pending_bytes += bytes as u64;
        let elapsed = now.saturating_duration_since(last).as_secs_f32();
        if elapsed <= 0.0 {
            return;
        }
        let rate = self.pending_bytes as f32 / elapsed;
        self.stats.avg_bytes_per_sec = if self.primed {
            self.stats.avg_bytes_per_sec + self.smoothing * (rate - self.stats.avg_bytes_per_sec)
        } else {
            rate
        };
        self.primed = true;
        self.pending_bytes = 0;
        self.last_sample = Some(now);
    }
}
