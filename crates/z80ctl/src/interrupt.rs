//! SIGINT as a cooperative cancellation flag.
//!
//! The long-running commands poll [`interrupted`] from their loops so that
//! the scoped guards in the core still run: the bus gets released, the
//! hardware clock re-enabled and the step interrupt disarmed before the
//! process exits.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the SIGINT handler. Idempotent.
pub fn install() {
    let handler = handle_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

/// Whether SIGINT has been received.
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}
