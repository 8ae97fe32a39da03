// Thin wrappers over the socket syscalls the transmission strategies need.
// std's TcpStream only exposes read/write; gathering sends, MSG_ZEROCOPY and
// the error queue have to go through libc.

use std::io::{self, IoSlice, IoSliceMut};
use std::mem;
use std::os::fd::RawFd;
use std::time::Duration;

/// `SO_EE_ORIGIN_ZEROCOPY` from `linux/errqueue.h`.
const SO_EE_ORIGIN_ZEROCOPY: u8 = 5;
/// Set in `ee_code` when the kernel had to copy instead of pinning pages.
const SO_EE_CODE_ZEROCOPY_COPIED: u8 = 1;

/// What a worker loop should do with a failed socket call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Interrupted or would block: check the shutdown flag and try again.
    Retry,
    /// The peer went away; the loop ends normally.
    PeerClosed,
    /// Anything else: log it and end this connection's loop.
    Fatal,
}

/// Map a socket error onto the loop policy shared by every strategy.
pub fn classify(err: &io::Error) -> Disposition {
    match err.raw_os_error() {
        Some(libc::EINTR) | Some(libc::EAGAIN) => Disposition::Retry,
        #[allow(unreachable_patterns)]
        Some(libc::EWOULDBLOCK) => Disposition::Retry,
        Some(libc::EPIPE) | Some(libc::ECONNRESET) => Disposition::PeerClosed,
        _ => match err.kind() {
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Disposition::Retry
            }
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => Disposition::PeerClosed,
            _ => Disposition::Fatal,
        },
    }
}

/// Resource exhaustion or invalid-state results from a `MSG_ZEROCOPY` send.
/// The same iteration falls back to an ordinary gathering send.
pub fn is_zerocopy_transient(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::ENOBUFS) | Some(libc::EINVAL))
}

#[inline]
fn cvt(ret: isize) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Single byte-stream send. `MSG_NOSIGNAL` is always added so a vanished peer
/// surfaces as `EPIPE` rather than a signal.
pub fn send(fd: RawFd, buf: &[u8], flags: libc::c_int) -> io::Result<usize> {
    let ret = unsafe {
        libc::send(
            fd,
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
            flags | libc::MSG_NOSIGNAL,
        )
    };
    cvt(ret)
}

/// Single byte-stream receive into `buf`.
pub fn recv(fd: RawFd, buf: &mut [u8], flags: libc::c_int) -> io::Result<usize> {
    let ret = unsafe {
        libc::recv(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            flags,
        )
    };
    cvt(ret)
}

/// Gathering send over `iov`.
pub fn sendmsg(fd: RawFd, iov: &[IoSlice<'_>], flags: libc::c_int) -> io::Result<usize> {
    // Safety: IoSlice is ABI compatible with iovec on unix.
    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    hdr.msg_iov = iov.as_ptr() as *mut libc::iovec;
    hdr.msg_iovlen = iov.len() as _;

    let ret = unsafe { libc::sendmsg(fd, &hdr, flags | libc::MSG_NOSIGNAL) };
    cvt(ret)
}

/// Scattering receive into `iov`.
pub fn recvmsg(fd: RawFd, iov: &mut [IoSliceMut<'_>], flags: libc::c_int) -> io::Result<usize> {
    let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
    hdr.msg_iov = iov.as_mut_ptr() as *mut libc::iovec;
    hdr.msg_iovlen = iov.len() as _;

    let ret = unsafe { libc::recvmsg(fd, &mut hdr, flags) };
    cvt(ret)
}

fn set_int_option(fd: RawFd, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Ask the kernel to allow `MSG_ZEROCOPY` sends on `fd`.
pub fn enable_zerocopy(fd: RawFd) -> io::Result<()> {
    set_int_option(fd, libc::SOL_SOCKET, libc::SO_ZEROCOPY, 1)
}

/// Receive timeout on a socket. On a listening socket this bounds `accept`,
/// which is how the acceptor gets to look at the shutdown flag.
pub fn set_recv_timeout(fd: RawFd, timeout: Duration) -> io::Result<()> {
    let tv = libc::timeval {
        tv_sec: timeout.as_secs() as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &tv as *const libc::timeval as *const libc::c_void,
            mem::size_of::<libc::timeval>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `struct sock_extended_err` from `linux/errqueue.h`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct SockExtendedErr {
    ee_errno: u32,
    ee_origin: u8,
    ee_type: u8,
    ee_code: u8,
    ee_pad: u8,
    ee_info: u32,
    ee_data: u32,
}

/// Zero-copy completion notifications read off the error queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completions {
    /// Number of sends the kernel reported as finished.
    pub completed: u64,
    /// Of those, how many notifications said the kernel copied anyway.
    pub copied: u64,
}

impl Completions {
    pub fn is_empty(&self) -> bool {
        self.completed == 0 && self.copied == 0
    }
}

/// Drain every pending zero-copy completion from `fd`'s error queue without
/// blocking.
///
/// Each notification covers an inclusive range `[ee_info, ee_data]` of send
/// sequence numbers.
pub fn drain_zerocopy_completions(fd: RawFd) -> io::Result<Completions> {
    let mut out = Completions::default();
    // Room for one cmsg carrying a sock_extended_err plus its offender address.
    let mut control = [0u64; 16];

    loop {
        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        hdr.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        hdr.msg_controllen = mem::size_of_val(&control) as _;

        let ret = unsafe { libc::recvmsg(fd, &mut hdr, libc::MSG_ERRQUEUE | libc::MSG_DONTWAIT) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(out),
                _ => Err(err),
            };
        }

        // Safety: hdr was filled in by the kernel and control outlives the walk.
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&hdr);
            while !cmsg.is_null() {
                let level = (*cmsg).cmsg_level;
                let kind = (*cmsg).cmsg_type;
                let is_recverr = (level == libc::SOL_IP && kind == libc::IP_RECVERR)
                    || (level == libc::SOL_IPV6 && kind == libc::IPV6_RECVERR);

                if is_recverr {
                    let ee: SockExtendedErr =
                        std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const SockExtendedErr);
                    if ee.ee_errno == 0 && ee.ee_origin == SO_EE_ORIGIN_ZEROCOPY {
                        let range = ee.ee_data.wrapping_sub(ee.ee_info) as u64 + 1;
                        out.completed += range;
                        if ee.ee_code & SO_EE_CODE_ZEROCOPY_COPIED != 0 {
                            out.copied += 1;
                        }
                    }
                }
                cmsg = libc::CMSG_NXTHDR(&hdr, cmsg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_follows_loop_policy() {
        let from = io::Error::from_raw_os_error;
        assert_eq!(classify(&from(libc::EINTR)), Disposition::Retry);
        assert_eq!(classify(&from(libc::EAGAIN)), Disposition::Retry);
        assert_eq!(classify(&from(libc::EPIPE)), Disposition::PeerClosed);
        assert_eq!(classify(&from(libc::ECONNRESET)), Disposition::PeerClosed);
        assert_eq!(classify(&from(libc::EBADF)), Disposition::Fatal);
        assert_eq!(
            classify(&io::Error::new(io::ErrorKind::WouldBlock, "timeout")),
            Disposition::Retry
        );
    }

    #[test]
    fn zerocopy_transient_errors() {
        assert!(is_zerocopy_transient(&io::Error::from_raw_os_error(libc::ENOBUFS)));
        assert!(is_zerocopy_transient(&io::Error::from_raw_os_error(libc::EINVAL)));
        assert!(!is_zerocopy_transient(&io::Error::from_raw_os_error(libc::EPIPE)));
    }

    #[test]
    fn draining_an_idle_socket_is_empty() {
        use std::net::{TcpListener, TcpStream};
        use std::os::fd::AsRawFd;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let got = drain_zerocopy_completions(stream.as_raw_fd()).unwrap();
        assert!(got.is_empty());
    }
}
