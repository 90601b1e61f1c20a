//! Runtime configuration for sessions and the shared timer.

use std::time::Duration;

/// Default reply timeout for reply-expected messages.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default heartbeat cadence for sessions in ready state.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// Default timer tick.
pub const DEFAULT_TIMER_TICK: Duration = Duration::from_secs(1);

/// Default maximum accepted frame size.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Default cap for a single incoming multi-block payload (1 GiB).
pub const DEFAULT_MAX_MULTIBLOCK_SIZE: u64 = 1024 * 1024 * 1024;

/// Configuration shared by all sessions of a controller.
///
/// The defaults match the protocol's nominal values; tests shrink the timer
/// durations to keep timeout scenarios fast.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a reply-expected message may wait before MESSAGE_TIMEOUT.
    pub reply_timeout: Duration,

    /// Interval between Heartbeat_Start frames on ready sessions.
    pub heartbeat_interval: Duration,

    /// Timer granularity; reply countdowns are measured in ticks.
    pub timer_tick: Duration,

    /// Frames larger than this are rejected as INVALID_MESSAGE_SIZE.
    pub max_frame_size: u32,

    /// Incoming multi-block transfers above this size are refused.
    pub max_multiblock_size: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            timer_tick: DEFAULT_TIMER_TICK,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_multiblock_size: DEFAULT_MAX_MULTIBLOCK_SIZE,
        }
    }
}

impl SessionConfig {
    /// Number of timer ticks covering the reply timeout, rounded up.
    pub(crate) fn reply_timeout_ticks(&self) -> u32 {
        let tick = self.timer_tick.as_millis().max(1);
        let timeout = self.reply_timeout.as_millis();
        timeout.div_ceil(tick).max(1) as u32
    }

    /// Number of timer ticks between heartbeats, rounded up.
    pub(crate) fn heartbeat_ticks(&self) -> u32 {
        let tick = self.timer_tick.as_millis().max(1);
        let interval = self.heartbeat_interval.as_millis();
        interval.div_ceil(tick).max(1) as u32
    }
}
