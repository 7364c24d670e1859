//! Linux namespace management for container isolation.
//!
//! Each namespace is entered with `unshare(2)` after a handle to the
//! original namespace has been opened, so the launcher can `setns(2)` back
//! if setup fails before hand-off.

pub mod mount;
pub mod uts;

use std::fs::File;
use std::os::fd::{AsFd, OwnedFd};

use nix::sched::CloneFlags;
use snow_common::types::NamespaceKind;

/// Handle to the namespace the launcher was in before `unshare(2)`.
#[derive(Debug)]
pub struct SavedNamespace {
    kind: NamespaceKind,
    fd: OwnedFd,
}

impl SavedNamespace {
    /// Wraps an open `/proc/<pid>/ns/<kind>` descriptor.
    #[must_use]
    pub const fn new(kind: NamespaceKind, fd: OwnedFd) -> Self {
        Self { kind, fd }
    }

    /// Which namespace this handle refers to.
    #[must_use]
    pub const fn kind(&self) -> NamespaceKind {
        self.kind
    }
}

/// `clone(2)` flag for a namespace kind.
#[must_use]
pub const fn clone_flag(kind: NamespaceKind) -> CloneFlags {
    match kind {
        NamespaceKind::Mount => CloneFlags::CLONE_NEWNS,
        NamespaceKind::Uts => CloneFlags::CLONE_NEWUTS,
        NamespaceKind::Ipc => CloneFlags::CLONE_NEWIPC,
        NamespaceKind::Pid => CloneFlags::CLONE_NEWPID,
        NamespaceKind::Network => CloneFlags::CLONE_NEWNET,
    }
}

/// Opens the caller's current namespace of `kind`.
///
/// # Errors
///
/// Returns the errno of the failed `open(2)`.
pub fn save_current(kind: NamespaceKind) -> nix::Result<SavedNamespace> {
    let path = format!("/proc/self/ns/{}", kind.proc_name());
    let file = File::open(&path).map_err(|e| crate::errno_of(&e))?;
    Ok(SavedNamespace::new(kind, OwnedFd::from(file)))
}

/// Saves the current namespace of `kind`, then moves the caller into a new one.
///
/// For [`NamespaceKind::Pid`] only later children are placed in the new
/// namespace; the caller keeps its PID.
///
/// # Errors
///
/// Returns the errno of the failed `open(2)` or `unshare(2)`.
pub fn enter(kind: NamespaceKind) -> nix::Result<SavedNamespace> {
    let saved = save_current(kind)?;
    nix::sched::unshare(clone_flag(kind))?;
    tracing::debug!(%kind, "namespace created");
    Ok(saved)
}

/// Moves the caller back into a saved namespace.
///
/// # Errors
///
/// Returns the errno of the failed `setns(2)`.
pub fn restore(saved: SavedNamespace) -> nix::Result<()> {
    nix::sched::setns(saved.fd.as_fd(), clone_flag(saved.kind))?;
    tracing::debug!(kind = %saved.kind, "returned to original namespace");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_flags_are_distinct() {
        let kinds = [
            NamespaceKind::Mount,
            NamespaceKind::Uts,
            NamespaceKind::Ipc,
            NamespaceKind::Pid,
            NamespaceKind::Network,
        ];
        let mut all = CloneFlags::empty();
        for kind in kinds {
            let flag = clone_flag(kind);
            assert!(!all.intersects(flag), "{kind} flag overlaps");
            all |= flag;
        }
    }

    #[test]
    fn save_current_opens_own_namespace_without_privilege() {
        let saved = save_current(NamespaceKind::Uts).expect("open /proc/self/ns/uts");
        assert_eq!(saved.kind(), NamespaceKind::Uts);
    }
}
