use super::ReceiverConfig;
use crate::Core::error::{Error, Result};
use crate::Core::shutdown::Shutdown;
use crate::Metrics::{ConnectionMetrics, ElapsedPolicy, GlobalMetrics, LoopExit, MetricsAggregator, ResultLine};
use crate::Transport::Strategy::LoopControl;
use std::net::TcpStream;
use std::os::fd::AsRawFd;
use std::thread;

/// The connecting side. Opens `threads` connections to the sender and
/// receives on each for the configured duration.
pub struct Receiver {
    config: ReceiverConfig,
    shutdown: Shutdown,
}

#[derive(Debug, Clone)]
pub struct ReceiverReport {
    pub totals: GlobalMetrics,
    /// Workers that managed to connect.
    pub connected: usize,
    /// Per-connection results in worker order.
    pub connections: Vec<ConnectionMetrics>,
    result: ResultLine,
}

impl ReceiverReport {
    /// The summary line printed at the end of a run.
    pub fn result_line(&self) -> &ResultLine {
        &self.result
    }
}

impl Receiver {
    pub(super) fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            shutdown: Shutdown::new(),
        }
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Spawn every worker, wait for all of them, and fold their metrics.
    /// Fails only when no worker could connect.
    pub fn run(&self) -> Result<ReceiverReport> {
        let cfg = &self.config;
        let aggregator = MetricsAggregator::new(ElapsedPolicy::LastReported);

        tracing::info!(
            peer = %cfg.peer,
            strategy = %cfg.strategy,
            threads = cfg.threads,
            message_size = cfg.message_size,
            "receiver starting"
        );

        let outcomes: Vec<std::result::Result<ConnectionMetrics, Error>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(cfg.threads);
            for worker_id in 0..cfg.threads {
                let aggregator = &aggregator;
                let spawned = thread::Builder::new()
                    .name(format!("receiver-{worker_id}"))
                    .spawn_scoped(scope, move || -> Result<ConnectionMetrics> {
                        let metrics = receive(cfg, &self.shutdown, worker_id)?;
                        aggregator.record(&metrics);
                        Ok(metrics)
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        tracing::error!(worker = worker_id, error = %err, "failed to spawn receiver worker")
                    }
                }
            }

            handles
                .into_iter()
                .filter_map(|handle| match handle.join() {
                    Ok(outcome) => Some(outcome),
                    Err(_) => {
                        tracing::error!("receiver worker panicked");
                        None
                    }
                })
                .collect()
        });

        let mut connections = Vec::new();
        let mut last_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(metrics) => connections.push(metrics),
                Err(err) => last_error = Some(err),
            }
        }
        if connections.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                Error::InvalidConfig("no receiver worker could be started".into())
            }));
        }

        let totals = aggregator.snapshot();
        let result = ResultLine::new(cfg.strategy, cfg.message_size, cfg.threads, &totals);
        tracing::info!(
            bytes = totals.total_bytes,
            messages = totals.total_messages,
            gbps = totals.throughput_gbps(),
            latency_us = totals.average_latency_us(),
            verify_failures = totals.verify_failures,
            "receiver finished"
        );

        Ok(ReceiverReport {
            totals,
            connected: connections.len(),
            connections,
            result,
        })
    }
}

/// One worker: connect, receive until stopped, report. The socket and the
/// receive buffers are gone by the time the metrics are returned.
fn receive(cfg: &ReceiverConfig, shutdown: &Shutdown, worker_id: usize) -> Result<ConnectionMetrics> {
    let stream = TcpStream::connect_timeout(&cfg.peer, cfg.connect_timeout).map_err(|source| {
        tracing::error!(worker = worker_id, peer = %cfg.peer, error = %source, "connect failed");
        Error::Connect {
            addr: cfg.peer,
            source,
        }
    })?;
    tracing::info!(worker = worker_id, peer = %cfg.peer, "connected");

    if let Err(err) = stream.set_read_timeout(Some(cfg.io_timeout)) {
        tracing::warn!(worker = worker_id, error = %err, "failed to set receive timeout");
    }

    let mut metrics = ConnectionMetrics::new(worker_id, Some(cfg.peer));
    metrics.strategy = Some(cfg.strategy);
    let ctl = LoopControl::new(shutdown, cfg.duration, worker_id);
    if let Err(err) = cfg
        .strategy
        .run_receiver(stream.as_raw_fd(), cfg.layout, &ctl, cfg.verify, &mut metrics)
    {
        tracing::error!(worker = worker_id, error = %err, "receiver worker failed");
        metrics.exit = LoopExit::Failed;
    }
    drop(stream);

    if metrics.verify_failures > 0 {
        tracing::warn!(worker = worker_id, failures = metrics.verify_failures, "received corrupted messages");
    }
    tracing::info!(
        worker = worker_id,
        bytes = metrics.bytes,
        messages = metrics.messages,
        secs = metrics.elapsed.as_secs_f64(),
        gbps = metrics.throughput_gbps(),
        latency_us = metrics.average_latency_us(),
        exit = ?metrics.exit,
        "receiver worker finished"
    );
    Ok(metrics)
}
