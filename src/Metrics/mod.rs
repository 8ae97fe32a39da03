// Per-connection counters and the process-wide aggregate built from them.

mod aggregator;
mod report;

pub use aggregator::{ElapsedPolicy, GlobalMetrics, MetricsAggregator};
pub use report::ResultLine;

use crate::Transport::Strategy::{Strategy, ZeroCopyState};
use std::net::SocketAddr;
use std::time::Duration;

/// `bytes * 8 / (seconds * 1e9)`, or 0 when `seconds <= 0`.
pub fn throughput_gbps(bytes: u64, seconds: f64) -> f64 {
    if seconds <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / (seconds * 1_000_000_000.0)
}

/// Why a worker's transmission loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopExit {
    /// The configured duration elapsed.
    #[default]
    Deadline,
    /// The shared shutdown flag was observed.
    Shutdown,
    /// EPIPE, ECONNRESET or an orderly close from the peer.
    PeerClosed,
    /// Any other socket error. The error itself is logged by the worker.
    Failed,
}

/// Zero-copy bookkeeping for one sending connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZeroCopyStats {
    pub state: ZeroCopyState,
    /// Sends the kernel accepted with `MSG_ZEROCOPY`.
    pub zerocopy_sends: u64,
    /// Sends issued without `MSG_ZEROCOPY`, either because the probe failed or
    /// because a zero-copy attempt hit ENOBUFS/EINVAL.
    pub fallback_sends: u64,
    /// Completion notifications drained from the error queue.
    pub completions: u64,
    /// Completions in which the kernel reported it copied the data anyway.
    pub copied: u64,
}

/// Counters owned by one worker for the life of its connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionMetrics {
    pub worker_id: usize,
    pub peer: Option<SocketAddr>,
    /// Unset until a worker starts its loop.
    pub strategy: Option<Strategy>,
    pub bytes: u64,
    pub messages: u64,
    pub elapsed: Duration,
    /// Sum of the wall-clock span of the receive calls that returned data
    /// (receiver only). Calls that hit the receive timeout are not counted.
    pub total_latency: Duration,
    pub exit: LoopExit,
    /// Received messages that did not match the fill pattern, when verifying.
    pub verify_failures: u64,
    /// Bytes of an incomplete trailing message dropped at loop exit.
    pub discarded_bytes: u64,
    pub zero_copy: Option<ZeroCopyStats>,
}

impl ConnectionMetrics {
    pub fn new(worker_id: usize, peer: Option<SocketAddr>) -> Self {
        Self {
            worker_id,
            peer,
            ..Self::default()
        }
    }

    /// Count one complete message of `bytes` bytes.
    #[inline]
    pub fn record_message(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
        self.messages += 1;
    }

    /// Count one complete received message and the time spent receiving it.
    #[inline]
    pub fn record_received(&mut self, bytes: usize, latency: Duration) {
        self.record_message(bytes);
        self.total_latency += latency;
    }

    /// Mean per-message latency in microseconds, 0 with no messages.
    pub fn average_latency_us(&self) -> f64 {
        if self.messages == 0 {
            return 0.0;
        }
        self.total_latency.as_secs_f64() * 1e6 / self.messages as f64
    }

    pub fn throughput_gbps(&self) -> f64 {
        throughput_gbps(self.bytes, self.elapsed.as_secs_f64())
    }
}
