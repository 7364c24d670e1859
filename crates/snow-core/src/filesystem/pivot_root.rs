//! Root filesystem switching via `pivot_root(2)`.
//!
//! Uses the `pivot_root(".", ".")` form: the old root ends up stacked on
//! top of the new one at `/` and is detached right away, so no directory
//! for the old root has to exist in the read-only image.

use std::path::Path;

use nix::mount::{MntFlags, umount2};

/// Makes `new_root` the root of the calling process's mount namespace.
///
/// On success the working directory is the new root, with the old root
/// mounted over it.
///
/// # Errors
///
/// Returns the errno of the failed `chdir(2)` or `pivot_root(2)`.
pub fn pivot_into(new_root: &Path) -> nix::Result<()> {
    nix::unistd::chdir(new_root)?;
    nix::unistd::pivot_root(".", ".")?;
    tracing::info!(new_root = %new_root.display(), "root switched");
    Ok(())
}

/// Detaches the old root left on `.` by [`pivot_into`].
///
/// # Errors
///
/// Returns the errno of the failed `umount2(2)`.
pub fn detach_old_root() -> nix::Result<()> {
    umount2(".", MntFlags::MNT_DETACH)?;
    tracing::debug!("old root detached");
    Ok(())
}
