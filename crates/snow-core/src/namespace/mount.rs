//! Mount namespace propagation.
//!
//! A fresh mount namespace starts as a copy of the parent's mount table
//! with the same propagation. Until the tree is made private, mounts made
//! by the launcher could propagate back to the host.

use nix::mount::{MsFlags, mount};

/// Marks every mount in the caller's namespace as private, recursively.
///
/// # Errors
///
/// Returns the errno of the failed `mount(2)`.
pub fn make_tree_private() -> nix::Result<()> {
    mount::<str, str, str, str>(None, "/", None, MsFlags::MS_REC | MsFlags::MS_PRIVATE, None)?;
    tracing::debug!("mount tree made private");
    Ok(())
}
