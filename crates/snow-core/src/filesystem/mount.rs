//! Mount syscall wrappers for executing a [`MountPlan`](super::plan::MountPlan).

use std::io::ErrorKind;
use std::path::{Component, Path};

use nix::errno::Errno;
use nix::mount::{MntFlags, mount, umount2};

use super::plan::MountOperation;

/// Issues the `mount(2)` call described by `op`, with `source` resolved.
///
/// # Errors
///
/// Returns the errno of the failed `mount(2)`.
pub fn apply(source: Option<&Path>, op: &MountOperation) -> nix::Result<()> {
    mount(source, &op.target, op.filesystem_kind, op.flags, op.data)?;
    tracing::debug!(operation = %op, "mounted");
    Ok(())
}

/// Checks that no component of `target` below `root` is a symbolic link.
///
/// `mount(2)` follows symlinks in its target, so a link inside the image
/// would place the mount outside `root`. The walk stops at the first
/// component that does not exist; the mount itself then fails.
///
/// # Errors
///
/// Returns `ELOOP` for a symlinked component, `EXDEV` if `target` is not
/// under `root`, or the errno of a failed `lstat(2)`.
pub fn ensure_no_symlinks(root: &Path, target: &Path) -> nix::Result<()> {
    let relative = target.strip_prefix(root).map_err(|_| Errno::EXDEV)?;
    let mut current = root.to_path_buf();
    for component in relative.components() {
        let Component::Normal(name) = component else {
            return Err(Errno::EXDEV);
        };
        current.push(name);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                tracing::warn!(path = %current.display(), "mount target passes through a symlink");
                return Err(Errno::ELOOP);
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(crate::errno_of(&e)),
        }
    }
    Ok(())
}

/// Lazily detaches the mount at `target`.
///
/// # Errors
///
/// Returns the errno of the failed `umount2(2)`.
pub fn detach(target: &Path) -> nix::Result<()> {
    umount2(target, MntFlags::MNT_DETACH)?;
    tracing::debug!(target = %target.display(), "unmounted");
    Ok(())
}
