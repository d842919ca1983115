//! Session configuration

use std::time::Duration;

/// Network transport options passed to the demuxer on open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Socket receive buffer size in bytes
    pub buffer_size: u32,

    /// Maximum demux delay in microseconds
    pub max_delay_us: u64,

    /// Force RTSP interleaved TCP transport
    pub force_tcp: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            buffer_size: 2_048_000,
            max_delay_us: 1_000_000,
            force_tcp: true,
        }
    }
}

impl TransportOptions {
    /// Key/value pairs in demuxer option syntax
    pub fn to_options(&self) -> Vec<(&'static str, String)> {
        let mut options = vec![
            ("buffer_size", self.buffer_size.to_string()),
            ("max_delay", self.max_delay_us.to_string()),
        ];
        if self.force_tcp {
            options.push(("rtsp_transport", "tcp".to_string()));
        }
        options
    }
}

/// Hardware device used for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwareDevice {
    #[default]
    Cuda,
}

impl HardwareDevice {
    pub fn name(self) -> &'static str {
        match self {
            HardwareDevice::Cuda => "CUDA",
        }
    }
}

/// What the packet queue does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Producer waits for space (propagates backpressure to the network)
    Block,
    /// Evict the oldest queued packet
    #[default]
    DropOldest,
    /// Discard the incoming packet
    DropNewest,
}

/// Retry policy for transient read failures in the demux loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRetryPolicy {
    /// Consecutive failures tolerated before the session reports an error.
    /// Zero retries forever.
    pub max_consecutive_failures: u32,

    /// Delay after the first failure
    pub initial_backoff: Duration,

    /// Upper bound for the doubled delay
    pub max_backoff: Duration,
}

impl Default for ReadRetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 50,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl ReadRetryPolicy {
    /// Delay before retrying after `failures` consecutive failures (1-based)
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_consecutive_failures > 0 && failures >= self.max_consecutive_failures
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Transport options for opening the input
    pub transport: TransportOptions,

    /// Hardware decode device
    pub device: HardwareDevice,

    /// Packet queue capacity
    pub queue_capacity: usize,

    /// Packet queue overflow behaviour
    pub overflow_policy: OverflowPolicy,

    /// Longest the decode worker waits for packets before re-checking the run flag
    pub pop_timeout: Duration,

    /// Demux read retry policy
    pub read_retry: ReadRetryPolicy,

    /// Request elevated scheduling priority for the demux thread
    pub elevated_priority: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transport: TransportOptions::default(),
            device: HardwareDevice::Cuda,
            queue_capacity: 256,
            overflow_policy: OverflowPolicy::DropOldest,
            pop_timeout: Duration::from_millis(100),
            read_retry: ReadRetryPolicy::default(),
            elevated_priority: true,
        }
    }
}

impl SessionConfig {
    /// Small queue, stale packets evicted first
    pub fn low_latency() -> Self {
        Self {
            transport: TransportOptions {
                buffer_size: 1_024_000,
                max_delay_us: 200_000,
                force_tcp: true,
            },
            queue_capacity: 32,
            overflow_policy: OverflowPolicy::DropOldest,
            ..Self::default()
        }
    }

    /// Large queue, producer blocks instead of dropping
    pub fn reliable() -> Self {
        Self {
            queue_capacity: 1024,
            overflow_policy: OverflowPolicy::Block,
            read_retry: ReadRetryPolicy {
                max_consecutive_failures: 200,
                initial_backoff: Duration::from_millis(20),
                max_backoff: Duration::from_secs(1),
            },
            ..Self::default()
        }
    }
}
