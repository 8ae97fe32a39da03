// MSG_ZEROCOPY sender and the (honestly named) page-aligned receiver.
//
// The kernel pins the field pages and transmits from them after sendmsg
// returns. The message is never mutated or freed while the loop runs, so
// the same descriptor can be handed over on every iteration without waiting
// for completions; completions are still drained so the error queue does not
// grow without bound and the socket's optmem budget is returned.

use super::scatter_gather::send_gathered;
use super::{drive, record_received, record_sent, transfer_exact, LoopControl, MessageLayout};
use crate::Core::alloc::{verify_pattern, Message, PageAlignedBuffer};
use crate::Core::error::Result;
use crate::Core::socket;
use crate::Metrics::{ConnectionMetrics, ZeroCopyStats};
use std::io::IoSliceMut;
use std::os::fd::RawFd;

/// Successful zero-copy sends between non-blocking drains of the error queue.
const COMPLETION_DRAIN_INTERVAL: u64 = 64;

/// Whether a connection may use `MSG_ZEROCOPY`.
///
/// Decided once per connection; `Unattempted` is only ever the starting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroCopyState {
    #[default]
    Unattempted,
    Active,
    Unavailable,
}

impl ZeroCopyState {
    /// Probe the socket option. A state that is already decided is returned
    /// unchanged.
    pub fn resolve(self, probe: ZeroCopyProbe, fd: RawFd, worker: usize) -> Self {
        if self != ZeroCopyState::Unattempted {
            return self;
        }
        match probe.enable(fd) {
            Ok(()) => {
                tracing::info!(worker, "MSG_ZEROCOPY enabled");
                ZeroCopyState::Active
            }
            Err(err) => {
                tracing::warn!(worker, error = %err, "MSG_ZEROCOPY not available, using regular sendmsg()");
                ZeroCopyState::Unavailable
            }
        }
    }

    pub fn is_active(self) -> bool {
        self == ZeroCopyState::Active
    }
}

/// How the `SO_ZEROCOPY` probe is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroCopyProbe {
    /// Ask the kernel.
    #[default]
    Kernel,
    /// Behave as if the kernel refused, exercising the fallback path.
    ForceUnavailable,
}

impl ZeroCopyProbe {
    fn enable(self, fd: RawFd) -> std::io::Result<()> {
        match self {
            ZeroCopyProbe::Kernel => socket::enable_zerocopy(fd),
            ZeroCopyProbe::ForceUnavailable => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "zero-copy disabled by configuration",
            )),
        }
    }
}

fn drain(fd: RawFd, stats: &mut ZeroCopyStats, worker: usize) {
    match socket::drain_zerocopy_completions(fd) {
        Ok(got) => {
            stats.completions += got.completed;
            stats.copied += got.copied;
        }
        Err(err) => tracing::debug!(worker, error = %err, "draining zero-copy completions failed"),
    }
}

pub(super) fn send_loop(
    fd: RawFd,
    message: &Message,
    ctl: &LoopControl<'_>,
    probe: ZeroCopyProbe,
    metrics: &mut ConnectionMetrics,
) -> Result<()> {
    let worker = ctl.worker_id();
    let state = ZeroCopyState::Unattempted.resolve(probe, fd, worker);
    let mut stats = ZeroCopyStats {
        state,
        ..ZeroCopyStats::default()
    };

    let desc = message.gather_descriptor();
    let mut since_drain = 0u64;

    drive(ctl, metrics, |metrics| {
        let step = send_gathered(&desc, ctl, |iov| {
            if !state.is_active() {
                let sent = socket::sendmsg(fd, iov, 0)?;
                stats.fallback_sends += 1;
                return Ok(sent);
            }
            match socket::sendmsg(fd, iov, libc::MSG_ZEROCOPY) {
                Ok(sent) => {
                    stats.zerocopy_sends += 1;
                    since_drain += 1;
                    Ok(sent)
                }
                Err(err) if socket::is_zerocopy_transient(&err) => {
                    tracing::debug!(worker, error = %err, "zero-copy send refused, copying this one");
                    let sent = socket::sendmsg(fd, iov, 0)?;
                    stats.fallback_sends += 1;
                    Ok(sent)
                }
                Err(err) => Err(err),
            }
        });

        if since_drain >= COMPLETION_DRAIN_INTERVAL {
            drain(fd, &mut stats, worker);
            since_drain = 0;
        }
        record_sent(step, metrics)
    });

    if state.is_active() {
        drain(fd, &mut stats, worker);
        tracing::debug!(
            worker,
            sends = stats.zerocopy_sends,
            completions = stats.completions,
            copied = stats.copied,
            "zero-copy completions drained"
        );
    }
    metrics.zero_copy = Some(stats);
    Ok(())
}

/// Receive side: one scattering receive into a single page-aligned buffer.
/// There is no receive-side zero-copy here; the data is still copied out of
/// the socket buffer.
pub(super) fn recv_loop(
    fd: RawFd,
    layout: MessageLayout,
    ctl: &LoopControl<'_>,
    verify: bool,
    metrics: &mut ConnectionMetrics,
) -> Result<()> {
    let mut buffer = PageAlignedBuffer::new(layout.total_size())?;
    let total = buffer.len();
    let mut iov = [IoSliceMut::new(buffer.as_mut_slice())];

    drive(ctl, metrics, |metrics| {
        let step = transfer_exact(total, ctl, "recvmsg", |off| {
            let [whole] = &mut iov;
            let mut rest = [IoSliceMut::new(&mut whole[off..])];
            socket::recvmsg(fd, &mut rest, libc::MSG_WAITALL)
        });
        record_received(step, metrics, || {
            verify && !verify_pattern(layout.field_size, &iov[0])
        })
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::fd::AsRawFd;

    #[test]
    fn forced_probe_is_unavailable_and_terminal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let fd = stream.as_raw_fd();

        let state = ZeroCopyState::Unattempted.resolve(ZeroCopyProbe::ForceUnavailable, fd, 0);
        assert_eq!(state, ZeroCopyState::Unavailable);
        // a decided state never goes back through the probe
        assert_eq!(state.resolve(ZeroCopyProbe::Kernel, fd, 0), ZeroCopyState::Unavailable);
        assert_eq!(
            ZeroCopyState::Active.resolve(ZeroCopyProbe::ForceUnavailable, fd, 0),
            ZeroCopyState::Active
        );
    }

    #[test]
    fn kernel_probe_decides_once() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let state = ZeroCopyState::Unattempted.resolve(ZeroCopyProbe::Kernel, stream.as_raw_fd(), 0);
        assert_ne!(state, ZeroCopyState::Unattempted);
    }
}
