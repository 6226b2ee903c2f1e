//! Ctrl-C handling: the first interrupt cancels cooperatively, the second
//! one terminates.

use converge::CancelToken;
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Forward SIGINT to `token`.
#[cfg(unix)]
pub fn install(token: &CancelToken) {
    use std::thread;
    use std::time::Duration;

    let handler = on_sigint as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe
    let previous = unsafe { libc::signal(libc::SIGINT, handler) };
    if previous == libc::SIG_ERR {
        log::warn!("Could not install SIGINT handler; Ctrl-C will abort immediately");
        return;
    }

    let token = token.clone();
    let spawned = thread::Builder::new()
        .name("sigint".into())
        .spawn(move || {
            while !INTERRUPTED.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
            }
            eprintln!("Interrupted: finishing in-flight steps (press Ctrl-C again to abort)");
            token.cancel();
            // SAFETY: restoring the default disposition has no preconditions
            unsafe {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
            }
        });
    if let Err(e) = spawned {
        log::warn!("Could not start SIGINT watcher: {e}");
    }
}

#[cfg(not(unix))]
pub fn install(_token: &CancelToken) {
    log::debug!("Cooperative cancellation on Ctrl-C is only available on unix");
}
