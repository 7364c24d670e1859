//! Filesystem management for container isolation.
//!
//! Provides mount plan construction, mount syscalls, loop device
//! attachment for the squashfs image, and `pivot_root` for switching the
//! root filesystem.

pub mod loopdev;
pub mod mount;
pub mod pivot_root;
pub mod plan;
