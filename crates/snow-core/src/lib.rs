//! # snow-core
//!
//! Low-level Linux isolation primitives for the snow launcher.
//!
//! This crate provides:
//! - **Capabilities**: the up-front privilege check.
//! - **Namespaces**: `unshare(2)` with the original namespace saved for `setns(2)`.
//! - **Filesystem**: mount plan construction, mount syscalls, loop devices,
//!   and `pivot_root`.
//! - **Signals**: blocking and polling termination signals during setup.
//! - **Host**: the [`host::Host`] trait that the launcher drives, with the
//!   production [`host::LinuxHost`].
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod capability;
pub mod filesystem;
pub mod host;
pub mod namespace;
pub mod signal;

/// Converts an I/O error into the errno it carries, defaulting to `EIO`.
pub(crate) fn errno_of(err: &std::io::Error) -> nix::errno::Errno {
    nix::errno::Errno::from_raw(err.raw_os_error().unwrap_or(libc::EIO))
}
