use crate::Core::error::{Error, Result};
use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Set from the SIGALRM handler. Only an atomic store happens there, which is
// async-signal-safe.
static ALARM_FIRED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_alarm(_signum: libc::c_int) {
    ALARM_FIRED.store(true, Ordering::SeqCst);
}

/// A broadcast cancellation flag shared by the acceptor and every worker.
///
/// Workers poll it once per loop iteration. Triggering is idempotent: any
/// number of calls, from any thread or signal handler, leave it set.
#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<CachePadded<AtomicBool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns `true` only for the call that flipped the flag.
    pub fn trigger(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    /// Whether shutdown was requested on this token or the process alarm fired.
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire) || ALARM_FIRED.load(Ordering::Relaxed)
    }

    /// Route SIGINT/SIGTERM to this token.
    ///
    /// `ctrlc` only allows one handler per process, so this is meant to be
    /// called once from a binary's `main`.
    pub fn install_signal_handlers(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.trigger() {
                tracing::info!("shutdown requested by signal");
            }
        })
        .map_err(|e| Error::Signal(e.to_string()))
    }

    /// Whether the SIGALRM backstop has gone off in this process.
    pub fn alarm_fired() -> bool {
        ALARM_FIRED.load(Ordering::Relaxed)
    }
}

/// Arm a SIGALRM hard stop `after` from now (rounded up to whole seconds).
///
/// Once it fires every [`Shutdown`] token in the process reads as triggered,
/// and any thread blocked in a syscall on this thread's signal path gets
/// `EINTR`. This is a backstop for threads that never observe their flag.
pub fn arm_alarm(after: Duration) -> Result<()> {
    let secs = after.as_secs().saturating_add(u64::from(after.subsec_nanos() > 0));
    let secs = libc::c_uint::try_from(secs.max(1))
        .map_err(|_| Error::InvalidConfig(format!("alarm of {secs}s is too long")))?;

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_alarm as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGALRM, &action, std::ptr::null_mut()) != 0 {
            return Err(Error::Signal(std::io::Error::last_os_error().to_string()));
        }
        libc::alarm(secs);
    }

    tracing::debug!(secs, "alarm armed");
    Ok(())
}

/// Cancel a pending alarm armed by [`arm_alarm`].
pub fn disarm_alarm() {
    unsafe {
        libc::alarm(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_beyond_the_timer_range_is_rejected() {
        assert!(matches!(arm_alarm(Duration::MAX), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn trigger_is_idempotent() {
        let token = Shutdown::new();
        let other = token.clone();
        assert!(!token.is_triggered());
        assert!(token.trigger());
        assert!(!other.trigger());
        assert!(other.is_triggered());
        assert!(token.is_triggered());
    }
}
