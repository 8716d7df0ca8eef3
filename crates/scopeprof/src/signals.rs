//! Flushing profile data when the process is interrupted or terminated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static CLEANED_UP: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

/// Flush the global profiler's unsaved data.
///
/// Runs at most once per global profiler, no matter how many signals arrive
/// or whether normal shutdown also calls it. Returns `true` for the call that
/// did the work.
pub fn cleanup() -> bool {
    if CLEANED_UP.swap(true, Ordering::AcqRel) {
        return false;
    }
    if crate::context::flush() {
        tracing::info!("Flushed unsaved profile data");
    }
    true
}

pub(crate) fn rearm_cleanup() {
    CLEANED_UP.store(false, Ordering::Release);
}

/// Route SIGINT and SIGTERM through [`cleanup`] before the process exits.
///
/// Blocks both signals in the calling thread and hands them to a dedicated
/// waiter thread. Threads inherit the mask, so call this early in `main`,
/// before spawning workers. Only the first call has an effect.
pub fn init_signal_handlers() {
    INSTALL.call_once(|| {
        #[cfg(unix)]
        match unix::install() {
            Ok(()) => tracing::debug!("Profiler signal handlers installed"),
            Err(e) => tracing::warn!("Failed to install profiler signal handlers: {}", e),
        }

        #[cfg(not(unix))]
        tracing::warn!("Signal-triggered profile flush is not supported on this platform");
    });
}

#[cfg(unix)]
mod unix {
    use std::io;
    use std::thread;

    use nix::sys::signal::{self, SigHandler, SigSet, Signal};

    pub(super) fn install() -> io::Result<()> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGINT);
        set.add(Signal::SIGTERM);
        set.thread_block()?;

        thread::Builder::new()
            .name("scopeprof-signals".into())
            .spawn(move || wait_for_signal(&set))?;
        Ok(())
    }

    fn wait_for_signal(set: &SigSet) {
        match set.wait() {
            Ok(sig) => {
                tracing::info!("Received {}, flushing profile data", sig);
                super::cleanup();
                reraise(sig);
            }
            Err(e) => tracing::warn!("Waiting for termination signals failed: {}", e),
        }
    }

    /// Let the signal terminate the process with its default disposition.
    fn reraise(sig: Signal) -> ! {
        // SAFETY: SIG_DFL installs no handler code, so no Rust runs in signal context.
        if let Err(e) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
            tracing::warn!("Failed to restore default handler for {}: {}", sig, e);
        }

        let mut only = SigSet::empty();
        only.add(sig);
        let _ = only.thread_unblock();
        let _ = signal::raise(sig);

        // Not reached when the default action terminates the process.
        std::process::exit(128 + sig as i32);
    }
}
