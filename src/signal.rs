//! Ctrl-C handling for submission runs
//!
//! The first SIGINT sets the cancel flag so the runner stops issuing new
//! submissions; a second one exits immediately with status 130.

use declarative::CancelToken;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit status for a run stopped by SIGINT
pub const INTERRUPTED_EXIT: u8 = 130;

static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Install the SIGINT handler (once) and return a token tied to it
pub fn cancel_on_interrupt() -> CancelToken {
    let mut installed = false;
    let flag = FLAG.get_or_init(|| {
        installed = true;
        Arc::new(AtomicBool::new(false))
    });
    if installed {
        install();
    }
    CancelToken::from_flag(Arc::clone(flag))
}

#[cfg(unix)]
extern "C" fn on_interrupt(_signal: libc::c_int) {
    if let Some(flag) = FLAG.get()
        && flag.swap(true, Ordering::SeqCst)
    {
        // SAFETY: _exit is async-signal-safe
        #[allow(unsafe_code)]
        unsafe {
            libc::_exit(libc::c_int::from(INTERRUPTED_EXIT));
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn install() {
    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only touches an atomic and calls _exit
    let previous = unsafe { libc::signal(libc::SIGINT, handler) };
    if previous == libc::SIG_ERR {
        log::warn!("Could not install SIGINT handler; Ctrl-C will abort immediately");
    } else {
        log::debug!("SIGINT handler installed");
    }
}

#[cfg(not(unix))]
fn install() {
    log::debug!("Graceful interrupt not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_share_one_flag() {
        let first = cancel_on_interrupt();
        let second = cancel_on_interrupt();
        assert!(!first.is_cancelled() || second.is_cancelled());
        first.cancel();
        assert!(second.is_cancelled());
    }
}
