// One-copy path: the kernel gathers from / scatters into the field buffers
// directly, so there is no user-space consolidation copy.

use super::{drive, record_received, record_sent, transfer_exact, LoopControl, MessageLayout, Step};
use crate::Core::alloc::{field_matches, remaining_mut, GatherDescriptor, Message, ScatterBufferSet};
use crate::Core::error::Result;
use crate::Core::socket;
use crate::Metrics::ConnectionMetrics;
use std::io::{self, IoSlice};
use std::os::fd::RawFd;

pub(super) fn send_loop(
    fd: RawFd,
    message: &Message,
    ctl: &LoopControl<'_>,
    metrics: &mut ConnectionMetrics,
) -> Result<()> {
    let desc = message.gather_descriptor();

    drive(ctl, metrics, |metrics| {
        let step = send_gathered(&desc, ctl, |iov| socket::sendmsg(fd, iov, 0));
        record_sent(step, metrics)
    });
    Ok(())
}

/// Send one whole message described by `desc`. After a short send, the rest
/// of the message goes out through a trimmed descriptor.
pub(super) fn send_gathered<F>(desc: &GatherDescriptor<'_>, ctl: &LoopControl<'_>, mut send: F) -> Step
where
    F: FnMut(&[IoSlice<'_>]) -> io::Result<usize>,
{
    transfer_exact(desc.total_len(), ctl, "sendmsg", |off| {
        if off == 0 {
            send(desc.slices())
        } else {
            send(&desc.remaining_after(off))
        }
    })
}

pub(super) fn recv_loop(
    fd: RawFd,
    layout: MessageLayout,
    ctl: &LoopControl<'_>,
    verify: bool,
    metrics: &mut ConnectionMetrics,
) -> Result<()> {
    let mut buffers = ScatterBufferSet::allocate(layout.fields, layout.field_size)?;
    let total = buffers.total_len();
    let mut iov = buffers.scatter_descriptor();

    drive(ctl, metrics, |metrics| {
        let step = transfer_exact(total, ctl, "recvmsg", |off| {
            if off == 0 {
                socket::recvmsg(fd, &mut iov, libc::MSG_WAITALL)
            } else {
                socket::recvmsg(fd, &mut remaining_mut(&mut iov, off), libc::MSG_WAITALL)
            }
        });
        record_received(step, metrics, || {
            verify && !iov.iter().enumerate().all(|(i, field)| field_matches(i, &field[..]))
        })
    });
    Ok(())
}
