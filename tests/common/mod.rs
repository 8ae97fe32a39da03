// Shared loopback setup for the end-to-end tests.
#![allow(dead_code)]

use dmxp_netcopy::Transport::Strategy::{Strategy, ZeroCopyProbe};
use dmxp_netcopy::Transport::{ReceiverBuilder, SenderBuilder, SenderReport, WorkerRegistry};
use dmxp_netcopy::Shutdown;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const FAST_TIMEOUT: Duration = Duration::from_millis(200);

pub struct RunningSender {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: Arc<WorkerRegistry>,
    pub handle: JoinHandle<SenderReport>,
}

impl RunningSender {
    pub fn stop(self) -> SenderReport {
        self.shutdown.trigger();
        self.handle.join().expect("sender thread panicked")
    }
}

pub fn sender_builder(strategy: Strategy, message_size: usize, duration: Duration) -> SenderBuilder {
    SenderBuilder::new()
        .with_bind_ip(LOCALHOST)
        .with_port(0)
        .with_strategy(strategy)
        .with_message_size(message_size)
        .with_duration(duration)
        .with_accept_timeout(FAST_TIMEOUT)
        .with_io_timeout(FAST_TIMEOUT)
        .with_run_for(duration + Duration::from_secs(30))
}

pub fn start_sender(builder: SenderBuilder) -> RunningSender {
    let sender = builder.build().expect("sender failed to bind");
    let addr = sender.local_addr();
    let shutdown = sender.shutdown_handle();
    let registry = sender.registry();
    let handle = thread::spawn(move || sender.run());
    RunningSender {
        addr,
        shutdown,
        registry,
        handle,
    }
}

pub fn start_default_sender(strategy: Strategy, message_size: usize, duration: Duration) -> RunningSender {
    start_sender(sender_builder(strategy, message_size, duration).with_zero_copy_probe(ZeroCopyProbe::Kernel))
}

pub fn receiver_builder(addr: SocketAddr, strategy: Strategy, message_size: usize, duration: Duration) -> ReceiverBuilder {
    ReceiverBuilder::new()
        .with_peer(addr)
        .with_strategy(strategy)
        .with_message_size(message_size)
        .with_duration(duration)
        .with_threads(1)
        .with_io_timeout(FAST_TIMEOUT)
}
