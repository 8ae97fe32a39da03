//! The three ways a message's bytes cross the user/kernel boundary.
//!
//! Every strategy shares the same loop policy: check the shutdown flag and the
//! deadline once per message, complete short transfers so the stream stays
//! message-aligned, treat EPIPE/ECONNRESET/EOF as a normal end and any other
//! error as the end of this connection only.

mod naive;
mod scatter_gather;
mod zero_copy;

pub use zero_copy::{ZeroCopyProbe, ZeroCopyState};

use crate::Core::alloc::Message;
use crate::Core::error::Result;
use crate::Core::shutdown::Shutdown;
use crate::Core::socket::{self, Disposition};
use crate::Metrics::{ConnectionMetrics, LoopExit};
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// One of the transmission variants under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Strategy {
    /// Serialize into one buffer, then `send`/`recv`.
    #[value(name = "two-copy", alias = "naive")]
    Naive,
    /// `sendmsg`/`recvmsg` straight over the field buffers.
    #[value(name = "one-copy", alias = "scatter-gather")]
    ScatterGather,
    /// `sendmsg` with `MSG_ZEROCOPY` where the kernel allows it.
    #[value(name = "zero-copy", alias = "zerocopy")]
    ZeroCopy,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Naive, Strategy::ScatterGather, Strategy::ZeroCopy];

    /// Name used in the result line.
    pub fn csv_name(self) -> &'static str {
        match self {
            Strategy::Naive => "two_copy",
            Strategy::ScatterGather => "one_copy",
            Strategy::ZeroCopy => "zero_copy",
        }
    }

    /// Run this strategy's send loop over a connected socket until the loop
    /// control says stop. Metrics are updated in place.
    pub fn run_sender(
        self,
        fd: RawFd,
        message: &Message,
        ctl: &LoopControl<'_>,
        probe: ZeroCopyProbe,
        metrics: &mut ConnectionMetrics,
    ) -> Result<()> {
        match self {
            Strategy::Naive => naive::send_loop(fd, message, ctl, metrics),
            Strategy::ScatterGather => scatter_gather::send_loop(fd, message, ctl, metrics),
            Strategy::ZeroCopy => zero_copy::send_loop(fd, message, ctl, probe, metrics),
        }
    }

    /// Run this strategy's receive loop. `field_size * fields` bytes make up
    /// one message.
    pub fn run_receiver(
        self,
        fd: RawFd,
        layout: MessageLayout,
        ctl: &LoopControl<'_>,
        verify: bool,
        metrics: &mut ConnectionMetrics,
    ) -> Result<()> {
        match self {
            Strategy::Naive => naive::recv_loop(fd, layout, ctl, verify, metrics),
            Strategy::ScatterGather => scatter_gather::recv_loop(fd, layout, ctl, verify, metrics),
            Strategy::ZeroCopy => zero_copy::recv_loop(fd, layout, ctl, verify, metrics),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.csv_name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "two-copy" | "naive" => Ok(Strategy::Naive),
            "one-copy" | "scatter-gather" => Ok(Strategy::ScatterGather),
            "zero-copy" | "zerocopy" => Ok(Strategy::ZeroCopy),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

/// Shape of a message on the wire: `fields` chunks of `field_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    pub field_size: usize,
    pub fields: usize,
}

impl MessageLayout {
    pub fn total_size(&self) -> usize {
        self.field_size * self.fields
    }
}

/// Per-worker stop conditions: the shared shutdown flag and a wall-clock
/// deadline.
pub struct LoopControl<'a> {
    shutdown: &'a Shutdown,
    /// `None` when the duration runs past what the clock can represent.
    deadline: Option<Instant>,
    worker_id: usize,
}

impl<'a> LoopControl<'a> {
    pub fn new(shutdown: &'a Shutdown, duration: Duration, worker_id: usize) -> Self {
        Self {
            shutdown,
            deadline: Instant::now().checked_add(duration),
            worker_id,
        }
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// `Some` once the loop should stop.
    #[inline]
    pub fn check(&self) -> Option<LoopExit> {
        if self.shutdown.is_triggered() {
            Some(LoopExit::Shutdown)
        } else if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Some(LoopExit::Deadline)
        } else {
            None
        }
    }

    /// Decide what a failed call means for the loop. `None` means retry.
    fn on_error(&self, err: &io::Error, op: &'static str) -> Option<LoopExit> {
        match socket::classify(err) {
            Disposition::Retry => self.check(),
            Disposition::PeerClosed => {
                tracing::info!(worker = self.worker_id, "peer disconnected during {op}");
                Some(LoopExit::PeerClosed)
            }
            Disposition::Fatal => {
                tracing::error!(worker = self.worker_id, error = %err, "{op} failed");
                Some(LoopExit::Failed)
            }
        }
    }
}

/// Outcome of moving one whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// The full message went through; `latency` spans every call it took.
    Done { bytes: usize, latency: Duration },
    /// The loop must stop. `partial` bytes of an incomplete message moved.
    Exit { exit: LoopExit, partial: usize },
}

/// Drive `op` until `total` bytes have moved. `op` gets the offset already
/// moved and returns how many more bytes one call moved.
pub(crate) fn transfer_exact<F>(total: usize, ctl: &LoopControl<'_>, name: &'static str, mut op: F) -> Step
where
    F: FnMut(usize) -> io::Result<usize>,
{
    let mut latency = Duration::ZERO;
    let mut done = 0;
    while done < total {
        // calls that time out or are interrupted do not count toward latency
        let call = Instant::now();
        match op(done) {
            Ok(0) => {
                tracing::info!(worker = ctl.worker_id, op = name, "peer closed connection");
                return Step::Exit {
                    exit: LoopExit::PeerClosed,
                    partial: done,
                };
            }
            Ok(n) => {
                latency += call.elapsed();
                done += n;
            }
            Err(err) => {
                if let Some(exit) = ctl.on_error(&err, name) {
                    return Step::Exit { exit, partial: done };
                }
            }
        }
    }
    Step::Done {
        bytes: done,
        latency,
    }
}

/// Fold a step into the sender's metrics. Returns the exit if the loop ends.
pub(crate) fn record_sent(step: Step, metrics: &mut ConnectionMetrics) -> Option<LoopExit> {
    match step {
        Step::Done { bytes, .. } => {
            metrics.record_message(bytes);
            None
        }
        Step::Exit { exit, partial } => {
            metrics.discarded_bytes += partial as u64;
            Some(exit)
        }
    }
}

/// Fold a step into the receiver's metrics. `corrupt` is only consulted for a
/// complete message.
pub(crate) fn record_received<F>(step: Step, metrics: &mut ConnectionMetrics, corrupt: F) -> Option<LoopExit>
where
    F: FnOnce() -> bool,
{
    match step {
        Step::Done { bytes, latency } => {
            metrics.record_received(bytes, latency);
            if corrupt() {
                metrics.verify_failures += 1;
            }
            None
        }
        Step::Exit { exit, partial } => {
            metrics.discarded_bytes += partial as u64;
            Some(exit)
        }
    }
}

/// Run a per-message loop until `body` reports an exit or the control stops it.
pub(crate) fn drive<F>(ctl: &LoopControl<'_>, metrics: &mut ConnectionMetrics, mut body: F)
where
    F: FnMut(&mut ConnectionMetrics) -> Option<LoopExit>,
{
    let started = Instant::now();
    let exit = loop {
        if let Some(exit) = ctl.check() {
            break exit;
        }
        if let Some(exit) = body(metrics) {
            break exit;
        }
    };
    metrics.elapsed = started.elapsed();
    metrics.exit = exit;
}
