// Shutdown flag behaviour across the acceptor and workers.
//
// Serialized because these tests start long-running senders and receivers
// and rely on them stopping promptly.

mod common;

use common::*;
use dmxp_netcopy::Metrics::LoopExit;
use dmxp_netcopy::Shutdown;
use dmxp_netcopy::Transport::Strategy::Strategy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
#[serial_test::serial]
fn double_trigger_is_harmless() {
    let shutdown = Shutdown::new();
    assert!(!shutdown.is_triggered());
    assert!(shutdown.trigger());
    assert!(!shutdown.trigger());
    assert!(shutdown.clone().is_triggered());
}

#[test]
#[serial_test::serial]
fn concurrent_triggers_flip_the_flag_once() {
    let shutdown = Shutdown::new();
    let winners = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let shutdown = shutdown.clone();
            let winners = winners.clone();
            thread::spawn(move || {
                if shutdown.trigger() {
                    winners.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(winners.load(Ordering::Relaxed), 1);
    assert!(shutdown.is_triggered());
}

#[test]
#[serial_test::serial]
fn shutdown_stops_long_runs_promptly() {
    let long = Duration::from_secs(60);
    let shutdown = Shutdown::new();

    let sender = dmxp_netcopy::SenderBuilder::new()
        .with_bind_ip(LOCALHOST)
        .with_port(0)
        .with_duration(long)
        .with_accept_timeout(FAST_TIMEOUT)
        .with_io_timeout(FAST_TIMEOUT)
        .build()
        .unwrap()
        .with_shutdown(shutdown.clone());
    let addr = sender.local_addr();
    let registry = sender.registry();
    let sender = thread::spawn(move || sender.run());

    let receiver = receiver_builder(addr, Strategy::Naive, 1024, long)
        .with_threads(2)
        .build()
        .unwrap()
        .with_shutdown(shutdown.clone());
    let started = Instant::now();
    let receiver = thread::spawn(move || receiver.run());

    thread::sleep(Duration::from_millis(500));
    shutdown.trigger();
    // a second request from elsewhere changes nothing
    shutdown.trigger();

    let received = receiver.join().unwrap().unwrap();
    let sent = sender.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(received.connected, 2);
    for conn in &received.connections {
        assert!(matches!(conn.exit, LoopExit::Shutdown | LoopExit::PeerClosed));
        assert_eq!(conn.bytes % 1024, 0);
    }
    assert_eq!(sent.registry.admitted, 2);
    assert_eq!(registry.active(), 0);
}
