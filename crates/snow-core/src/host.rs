//! The kernel surface the launcher drives.
//!
//! Every privileged or process-wide operation of a launch goes through
//! [`Host`]. [`LinuxHost`] issues the real system calls; alternative
//! implementations can record or fail calls to exercise the launcher's
//! ordering and cleanup logic without privileges.

use std::ffi::{CStr, CString};
use std::path::Path;

use nix::errno::Errno;
use snow_common::types::{ImageLocation, NamespaceKind};

use crate::filesystem::loopdev::{self, LoopDevice};
use crate::filesystem::plan::MountOperation;
use crate::filesystem::{mount, pivot_root};
use crate::namespace::{self, SavedNamespace};
use crate::signal::SignalGuard;

/// Operations the launcher performs on the running kernel.
pub trait Host {
    /// Effective capability mask of the calling process.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability set cannot be read.
    fn effective_capabilities(&self) -> std::io::Result<u64>;

    /// A termination signal number waiting to be handled, if any.
    fn pending_termination(&self) -> Option<i32>;

    /// Saves the current namespace of `kind` and unshares into a new one.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn enter_namespace(&mut self, kind: NamespaceKind) -> nix::Result<SavedNamespace>;

    /// Returns to a namespace saved by [`enter_namespace`](Self::enter_namespace).
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn restore_namespace(&mut self, saved: SavedNamespace) -> nix::Result<()>;

    /// Makes every mount in the current namespace private.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn make_mounts_private(&mut self) -> nix::Result<()>;

    /// Sets the hostname of the current UTS namespace.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn set_hostname(&mut self, hostname: &str) -> nix::Result<()>;

    /// Binds the image to a free loop device.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn attach_loop(&mut self, image: &ImageLocation) -> nix::Result<LoopDevice>;

    /// Unbinds a loop device.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn detach_loop(&mut self, device: LoopDevice) -> nix::Result<()>;

    /// Checks that `target` resolves under `root` without following a symlink.
    ///
    /// # Errors
    ///
    /// Returns `ELOOP` if a component of `target` is a symlink.
    fn verify_mount_target(&self, root: &Path, target: &Path) -> nix::Result<()>;

    /// Performs one mount operation with its source resolved.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn mount(&mut self, source: Option<&Path>, op: &MountOperation) -> nix::Result<()>;

    /// Lazily unmounts `target`.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn unmount(&mut self, target: &Path) -> nix::Result<()>;

    /// Switches the root to `new_root`, leaving the old root stacked on `.`.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn pivot_root(&mut self, new_root: &Path) -> nix::Result<()>;

    /// Detaches the old root left behind by [`pivot_root`](Self::pivot_root).
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn detach_old_root(&mut self) -> nix::Result<()>;

    /// Changes the working directory.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed call.
    fn chdir(&mut self, path: &Path) -> nix::Result<()>;

    /// Replaces the process image. Returns only on failure.
    fn exec(&mut self, path: &CStr, argv: &[CString], envp: &[CString]) -> Errno;
}

/// [`Host`] backed by real Linux system calls.
///
/// Creating one blocks the termination signals; they stay blocked until
/// [`Host::exec`] hands off.
#[derive(Debug)]
pub struct LinuxHost {
    signals: SignalGuard,
}

impl LinuxHost {
    /// Prepares the host, blocking termination signals.
    ///
    /// # Errors
    ///
    /// Returns the errno of the failed `sigprocmask(2)`.
    pub fn new() -> nix::Result<Self> {
        Ok(Self {
            signals: SignalGuard::block()?,
        })
    }
}

impl Host for LinuxHost {
    fn effective_capabilities(&self) -> std::io::Result<u64> {
        crate::capability::read_effective_mask()
    }

    fn pending_termination(&self) -> Option<i32> {
        self.signals.pending().map(|signal| signal as i32)
    }

    fn enter_namespace(&mut self, kind: NamespaceKind) -> nix::Result<SavedNamespace> {
        namespace::enter(kind)
    }

    fn restore_namespace(&mut self, saved: SavedNamespace) -> nix::Result<()> {
        namespace::restore(saved)
    }

    fn make_mounts_private(&mut self) -> nix::Result<()> {
        namespace::mount::make_tree_private()
    }

    fn set_hostname(&mut self, hostname: &str) -> nix::Result<()> {
        namespace::uts::set_hostname(hostname)
    }

    fn attach_loop(&mut self, image: &ImageLocation) -> nix::Result<LoopDevice> {
        loopdev::attach(image)
    }

    fn detach_loop(&mut self, device: LoopDevice) -> nix::Result<()> {
        loopdev::detach(device)
    }

    fn verify_mount_target(&self, root: &Path, target: &Path) -> nix::Result<()> {
        mount::ensure_no_symlinks(root, target)
    }

    fn mount(&mut self, source: Option<&Path>, op: &MountOperation) -> nix::Result<()> {
        mount::apply(source, op)
    }

    fn unmount(&mut self, target: &Path) -> nix::Result<()> {
        mount::detach(target)
    }

    fn pivot_root(&mut self, new_root: &Path) -> nix::Result<()> {
        pivot_root::pivot_into(new_root)
    }

    fn detach_old_root(&mut self) -> nix::Result<()> {
        pivot_root::detach_old_root()
    }

    fn chdir(&mut self, path: &Path) -> nix::Result<()> {
        nix::unistd::chdir(path)
    }

    fn exec(&mut self, path: &CStr, argv: &[CString], envp: &[CString]) -> Errno {
        if let Err(e) = self.signals.restore() {
            return e;
        }
        let err = match nix::unistd::execve(path, argv, envp) {
            Err(e) => e,
            Ok(never) => match never {},
        };
        if let Err(e) = self.signals.reblock() {
            tracing::warn!(error = %e, "failed to re-block termination signals");
        }
        err
    }
}
