//! Termination signal handling during setup.
//!
//! The launcher must stay single-threaded (`unshare(CLONE_NEWNS)` refuses
//! multi-threaded callers), so instead of a handler thread the termination
//! signals are blocked for the duration of setup and polled between steps.
//! A signal that arrives stays pending until setup notices it and tears
//! down. The original mask is restored right before `execve(2)` so the
//! target inherits normal signal behaviour.

#![allow(unsafe_code)]

use std::mem::MaybeUninit;

use nix::sys::signal::{SigSet, SigmaskHow, Signal, sigprocmask};

/// Signals that abort setup and trigger teardown.
pub const TERMINATION_SIGNALS: [Signal; 4] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGHUP,
    Signal::SIGQUIT,
];

/// Keeps [`TERMINATION_SIGNALS`] blocked and remembers the original mask.
#[derive(Debug)]
pub struct SignalGuard {
    original: SigSet,
    watched: SigSet,
}

impl SignalGuard {
    /// Blocks the termination signals for the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed `sigprocmask(2)`.
    pub fn block() -> nix::Result<Self> {
        let mut watched = SigSet::empty();
        for signal in TERMINATION_SIGNALS {
            watched.add(signal);
        }
        let mut original = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&watched), Some(&mut original))?;
        tracing::trace!("termination signals blocked");
        Ok(Self { original, watched })
    }

    /// Returns the first termination signal waiting to be delivered.
    #[must_use]
    pub fn pending(&self) -> Option<Signal> {
        let mut set = MaybeUninit::<libc::sigset_t>::uninit();
        // SAFETY: `sigpending` fully initialises the set on success; on
        // failure the set is never read.
        let set = unsafe {
            if libc::sigpending(set.as_mut_ptr()) != 0 {
                return None;
            }
            set.assume_init()
        };
        TERMINATION_SIGNALS.into_iter().find(|signal| {
            // SAFETY: `set` is an initialised signal set.
            unsafe { libc::sigismember(&raw const set, *signal as libc::c_int) == 1 }
        })
    }

    /// Puts the original signal mask back.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed `sigprocmask(2)`.
    pub fn restore(&self) -> nix::Result<()> {
        sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.original), None)
    }

    /// Blocks the termination signals again after [`restore`](Self::restore).
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed `sigprocmask(2)`.
    pub fn reblock(&self) -> nix::Result<()> {
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&self.watched), None)
    }
}
