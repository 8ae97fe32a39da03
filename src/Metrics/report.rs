use super::GlobalMetrics;
use crate::Transport::Strategy::Strategy;
use std::fmt;

/// The single machine-parsable line a receiver prints when it finishes.
///
/// `CSV: <strategy>,<message size>,<threads>,<gbps>,<latency us>,<total bytes>`
#[derive(Debug, Clone, PartialEq)]
pub struct ResultLine {
    pub strategy: Strategy,
    pub message_size: usize,
    pub threads: usize,
    pub throughput_gbps: f64,
    pub average_latency_us: f64,
    pub total_bytes: u64,
}

impl ResultLine {
    pub fn new(strategy: Strategy, message_size: usize, threads: usize, totals: &GlobalMetrics) -> Self {
        Self {
            strategy,
            message_size,
            threads,
            throughput_gbps: totals.throughput_gbps(),
            average_latency_us: totals.average_latency_us(),
            total_bytes: totals.total_bytes,
        }
    }
}

impl fmt::Display for ResultLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CSV: {},{},{},{:.4},{:.2},{}",
            self.strategy.csv_name(),
            self.message_size,
            self.threads,
            self.throughput_gbps,
            self.average_latency_us,
            self.total_bytes
        )
    }
}
