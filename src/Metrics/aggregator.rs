use super::{throughput_gbps, ConnectionMetrics, LoopExit};
use parking_lot::Mutex;
use std::time::Duration;

/// Which worker's elapsed time stands for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElapsedPolicy {
    /// The longest-running worker (sender side).
    Longest,
    /// Whichever worker reported last (receiver side).
    LastReported,
}

/// Process-wide totals folded from finished workers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalMetrics {
    pub total_bytes: u64,
    pub total_messages: u64,
    /// Representative elapsed time chosen by the aggregator's policy.
    pub elapsed: Duration,
    /// Sum of each worker's own average latency, in microseconds.
    pub latency_sum_us: f64,
    /// Number of workers that reported.
    pub workers: usize,
    /// Workers whose loop ended on a fatal socket error.
    pub failed_workers: usize,
    pub verify_failures: u64,
    pub zerocopy_sends: u64,
    pub fallback_sends: u64,
    pub completions: u64,
}

impl GlobalMetrics {
    fn fold(&mut self, m: &ConnectionMetrics, policy: ElapsedPolicy) {
        self.total_bytes += m.bytes;
        self.total_messages += m.messages;
        self.latency_sum_us += m.average_latency_us();
        self.workers += 1;
        self.verify_failures += m.verify_failures;
        if m.exit == LoopExit::Failed {
            self.failed_workers += 1;
        }
        if let Some(zc) = &m.zero_copy {
            self.zerocopy_sends += zc.zerocopy_sends;
            self.fallback_sends += zc.fallback_sends;
            self.completions += zc.completions;
        }

        self.elapsed = match policy {
            ElapsedPolicy::Longest => self.elapsed.max(m.elapsed),
            ElapsedPolicy::LastReported => m.elapsed,
        };
    }

    /// Total bytes over the representative elapsed time.
    pub fn throughput_gbps(&self) -> f64 {
        throughput_gbps(self.total_bytes, self.elapsed.as_secs_f64())
    }

    /// Mean of the per-worker average latencies, 0 with no workers.
    pub fn average_latency_us(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.latency_sum_us / self.workers as f64
    }
}

/// Thread-safe accumulator that finishing workers fold their metrics into.
///
/// The lock is held only for the arithmetic; no I/O happens under it.
pub struct MetricsAggregator {
    policy: ElapsedPolicy,
    inner: Mutex<GlobalMetrics>,
}

impl MetricsAggregator {
    pub fn new(policy: ElapsedPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(GlobalMetrics::default()),
        }
    }

    pub fn record(&self, metrics: &ConnectionMetrics) {
        self.inner.lock().fold(metrics, self.policy);
    }

    pub fn snapshot(&self) -> GlobalMetrics {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn worker(id: usize, bytes: u64, secs: u64, latency_us: u64) -> ConnectionMetrics {
        let mut m = ConnectionMetrics::new(id, None);
        m.bytes = bytes;
        m.messages = 1;
        m.elapsed = Duration::from_secs(secs);
        m.total_latency = Duration::from_micros(latency_us);
        m
    }

    #[test]
    fn longest_policy_keeps_max_elapsed() {
        let agg = MetricsAggregator::new(ElapsedPolicy::Longest);
        agg.record(&worker(0, 100, 3, 0));
        agg.record(&worker(1, 100, 1, 0));
        let g = agg.snapshot();
        assert_eq!(g.elapsed, Duration::from_secs(3));
        assert_eq!(g.total_bytes, 200);
    }

    #[test]
    fn last_reported_policy_takes_latest() {
        let agg = MetricsAggregator::new(ElapsedPolicy::LastReported);
        agg.record(&worker(0, 100, 3, 0));
        agg.record(&worker(1, 100, 1, 0));
        assert_eq!(agg.snapshot().elapsed, Duration::from_secs(1));
    }

    #[test]
    fn latency_is_mean_of_worker_means() {
        let agg = MetricsAggregator::new(ElapsedPolicy::LastReported);
        let mut a = worker(0, 0, 1, 10);
        a.messages = 1;
        let mut b = worker(1, 0, 1, 300);
        b.messages = 10; // 30us each
        agg.record(&a);
        agg.record(&b);
        assert!((agg.snapshot().average_latency_us() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let agg = Arc::new(MetricsAggregator::new(ElapsedPolicy::Longest));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let agg = agg.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        agg.record(&worker(t * 100 + i, 10, 1, 0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let g = agg.snapshot();
        assert_eq!(g.workers, 800);
        assert_eq!(g.total_bytes, 8000);
    }
}
