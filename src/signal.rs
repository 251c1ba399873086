//! SIGINT handling: the first Ctrl-C requests a graceful stop, the second one kills.
use std::sync::atomic::{AtomicU32, Ordering};

static SIGINT_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(unix)]
extern "C" fn handle_sigint(_sig: std::os::raw::c_int) {
    SIGINT_COUNT.fetch_add(1, Ordering::SeqCst);
}

/// Install the handler. SA_RESETHAND restores the default disposition after the first
/// delivery, so a second Ctrl-C terminates the process immediately.
#[cfg(unix)]
pub fn install_interrupt_handler() -> nix::Result<()> {
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

    let act = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::SA_RESTART | SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    // SAFETY: the handler only touches an atomic.
    unsafe { signal::sigaction(Signal::SIGINT, &act) }.map(|_| ())
}

#[cfg(not(unix))]
pub fn install_interrupt_handler() -> std::io::Result<()> {
    Ok(())
}

pub fn interrupted() -> bool {
    SIGINT_COUNT.load(Ordering::SeqCst) > 0
}
