// Two-copy baseline: one contiguous buffer, plain send/recv.

use super::{drive, record_received, record_sent, transfer_exact, LoopControl, MessageLayout};
use crate::Core::alloc::{verify_pattern, Message};
use crate::Core::error::{Error, Result};
use crate::Core::socket;
use crate::Metrics::ConnectionMetrics;
use std::os::fd::RawFd;

/// Serialize once, then send the whole buffer per iteration.
pub(super) fn send_loop(
    fd: RawFd,
    message: &Message,
    ctl: &LoopControl<'_>,
    metrics: &mut ConnectionMetrics,
) -> Result<()> {
    let serialized = message.serialize()?;
    let bytes = serialized.as_bytes();

    drive(ctl, metrics, |metrics| {
        let step = transfer_exact(bytes.len(), ctl, "send", |off| {
            socket::send(fd, &bytes[off..], 0)
        });
        record_sent(step, metrics)
    });
    Ok(())
}

/// Receive into one buffer of exactly one message, timing each message.
pub(super) fn recv_loop(
    fd: RawFd,
    layout: MessageLayout,
    ctl: &LoopControl<'_>,
    verify: bool,
    metrics: &mut ConnectionMetrics,
) -> Result<()> {
    let total = layout.total_size();
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(total)
        .map_err(|_| Error::SerializeAllocation { requested: total })?;
    buf.resize(total, 0);

    drive(ctl, metrics, |metrics| {
        let step = transfer_exact(total, ctl, "recv", |off| {
            socket::recv(fd, &mut buf[off..], libc::MSG_WAITALL)
        });
        record_received(step, metrics, || {
            verify && !verify_pattern(layout.field_size, &buf)
        })
    });
    Ok(())
}
