use super::registry::{RegistryStats, SlotGuard, WorkerRegistry};
use super::SenderConfig;
use crate::Core::alloc::Message;
use crate::Core::error::{Error, Result};
use crate::Core::shutdown::Shutdown;
use crate::Core::socket::{self, Disposition};
use crate::Metrics::{ConnectionMetrics, ElapsedPolicy, GlobalMetrics, LoopExit, MetricsAggregator};
use crate::Transport::Strategy::LoopControl;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Pause after an accept error that is not a timeout, so a persistent failure
/// such as EMFILE does not spin the acceptor.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// The listening side. Accepts connections and gives each admitted one its
/// own worker thread that transmits for the configured duration.
pub struct Sender {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<SenderConfig>,
    shutdown: Shutdown,
    registry: Arc<WorkerRegistry>,
    metrics: Arc<MetricsAggregator>,
    next_worker_id: usize,
}

/// What a finished [`Sender::run`] observed.
#[derive(Debug, Clone)]
pub struct SenderReport {
    pub totals: GlobalMetrics,
    pub registry: RegistryStats,
}

impl Sender {
    pub(super) fn bind(config: SenderConfig) -> Result<Self> {
        let addr = config.bind_addr;
        let listener = TcpListener::bind(addr).map_err(|source| Error::Bind { addr, source })?;
        // accept() wakes up at least this often to look at the shutdown flag
        socket::set_recv_timeout(listener.as_raw_fd(), config.accept_timeout).map_err(Error::SocketOption)?;
        let local_addr = listener.local_addr()?;

        tracing::info!(
            addr = %local_addr,
            strategy = %config.strategy,
            message_size = config.message_size,
            max_connections = config.max_connections,
            "sender listening"
        );

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(WorkerRegistry::with_capacity(config.max_connections)),
            config: Arc::new(config),
            shutdown: Shutdown::new(),
            metrics: Arc::new(MetricsAggregator::new(ElapsedPolicy::Longest)),
            next_worker_id: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// A handle to the flag that stops the acceptor and every worker.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Share an existing shutdown token instead of the sender's own.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn registry(&self) -> Arc<WorkerRegistry> {
        self.registry.clone()
    }

    /// Accept until shutdown (or the configured run window ends), then join
    /// every worker and return the folded metrics.
    pub fn run(mut self) -> SenderReport {
        let window_end = self.config.run_for.and_then(|window| Instant::now().checked_add(window));

        while !self.shutdown.is_triggered() {
            if window_end.is_some_and(|end| Instant::now() >= end) {
                tracing::info!("accept window elapsed");
                break;
            }
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(err) => self.on_accept_error(&err),
            }
        }

        self.shutdown.trigger();
        let joined = self.registry.join_all();
        tracing::info!(joined, "all sender workers joined");

        let report = SenderReport {
            totals: self.metrics.snapshot(),
            registry: self.registry.stats(),
        };
        tracing::info!(
            bytes = report.totals.total_bytes,
            messages = report.totals.total_messages,
            gbps = report.totals.throughput_gbps(),
            connections = report.registry.admitted,
            rejected = report.registry.rejected,
            "sender finished"
        );
        report
    }

    fn on_accept_error(&self, err: &io::Error) {
        match socket::classify(err) {
            Disposition::Retry => {}
            _ => {
                tracing::warn!(error = %err, "accept failed");
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let Some(slot) = self.registry.try_admit() else {
            tracing::warn!(
                %peer,
                max = self.registry.capacity(),
                "maximum connections reached, rejecting client"
            );
            drop(stream);
            return;
        };

        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;
        tracing::info!(worker = worker_id, %peer, active = self.registry.active(), "client connected");

        let guard = SlotGuard::new(self.registry.clone(), slot);
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        let metrics = self.metrics.clone();

        let spawned = thread::Builder::new()
            .name(format!("sender-{worker_id}"))
            .spawn(move || {
                let _slot = guard;
                let result = transmit(&config, &shutdown, stream, peer, worker_id);
                metrics.record(&result);
            });

        match spawned {
            Ok(handle) => self.registry.attach(slot, handle),
            Err(err) => {
                // the closure, its stream and its guard were dropped with the error
                tracing::error!(worker = worker_id, error = %err, "failed to spawn sender worker");
                self.registry.abandon(slot);
            }
        }
    }
}

/// One connection's whole life. The stream and message are released before
/// the metrics are returned.
fn transmit(
    config: &SenderConfig,
    shutdown: &Shutdown,
    stream: TcpStream,
    peer: SocketAddr,
    worker_id: usize,
) -> ConnectionMetrics {
    let mut metrics = ConnectionMetrics::new(worker_id, Some(peer));
    metrics.strategy = Some(config.strategy);

    if let Err(err) = stream.set_write_timeout(Some(config.io_timeout)) {
        tracing::warn!(worker = worker_id, error = %err, "failed to set send timeout");
    }

    match Message::allocate(config.layout.field_size) {
        Ok(message) => {
            let ctl = LoopControl::new(shutdown, config.duration, worker_id);
            let outcome = config.strategy.run_sender(
                stream.as_raw_fd(),
                &message,
                &ctl,
                config.zero_copy_probe,
                &mut metrics,
            );
            if let Err(err) = outcome {
                tracing::error!(worker = worker_id, error = %err, "sender worker failed");
                metrics.exit = LoopExit::Failed;
            }
            message.release();
        }
        Err(err) => {
            tracing::error!(worker = worker_id, error = %err, "failed to allocate message");
            metrics.exit = LoopExit::Failed;
        }
    }
    drop(stream);

    tracing::info!(
        worker = worker_id,
        %peer,
        bytes = metrics.bytes,
        messages = metrics.messages,
        secs = metrics.elapsed.as_secs_f64(),
        gbps = metrics.throughput_gbps(),
        exit = ?metrics.exit,
        "sender worker finished"
    );
    metrics
}
