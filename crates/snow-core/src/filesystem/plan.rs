//! Mount plan construction.
//!
//! Turns a [`ContainerSpec`] into the ordered list of mounts that builds
//! the container's filesystem view. Construction is pure: no filesystem
//! access, same input gives the same plan.

use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use nix::mount::MsFlags;
use snow_common::error::{LaunchError, Result};
use snow_common::types::{BindMount, ContainerSpec, PseudoFilesystem};

/// Where a mount takes its source from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// The image's loop device, known only once it has been attached.
    Image,
    /// A host path (bind mounts).
    Path(PathBuf),
    /// A nominal source string for pseudo-filesystems, such as `proc`.
    Named(&'static str),
    /// No source (remounts).
    None,
}

impl fmt::Display for MountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("<image>"),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Named(name) => f.write_str(name),
            Self::None => f.write_str("none"),
        }
    }
}

/// One `mount(2)` call of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOperation {
    /// Mount source.
    pub source: MountSource,
    /// Absolute host path, always under the plan root.
    pub target: PathBuf,
    /// Filesystem type; `None` for binds and remounts.
    pub filesystem_kind: Option<&'static str>,
    /// Mount flags.
    pub flags: MsFlags,
    /// Filesystem-specific options.
    pub data: Option<&'static str>,
    /// Whether the call creates a mount that teardown must remove.
    pub is_removable: bool,
}

impl fmt::Display for MountOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.flags.contains(MsFlags::MS_REMOUNT) {
            "remount"
        } else if self.flags.contains(MsFlags::MS_BIND) {
            "bind"
        } else {
            self.filesystem_kind.unwrap_or("mount")
        };
        write!(f, "{kind} {} on {}", self.source, self.target.display())?;
        if self.flags.contains(MsFlags::MS_RDONLY) {
            f.write_str(" (ro)")?;
        }
        Ok(())
    }
}

/// Ordered mounts rooted at a single mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPlan {
    root: PathBuf,
    operations: Vec<MountOperation>,
}

impl MountPlan {
    /// Host directory the image is mounted on; the future `/`.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Operations in execution order. The first one mounts the image.
    #[must_use]
    pub fn operations(&self) -> &[MountOperation] {
        &self.operations
    }
}

/// Builds the mount plan for `spec`.
///
/// The image is mounted read-only at the spec's mount point, then each
/// pseudo-filesystem (first occurrence wins, shallower paths first), then
/// each bind mount.
///
/// # Errors
///
/// Returns `LaunchError::Config` if the mount point is not absolute, and
/// `LaunchError::MalformedMountPlan` if any target escapes the mount point.
pub fn build_plan(spec: &ContainerSpec) -> Result<MountPlan> {
    let root = spec.mount_point.clone();
    if !root.is_absolute() {
        return Err(LaunchError::Config {
            message: format!("mount point must be absolute: {}", root.display()),
        });
    }

    let mut operations = vec![MountOperation {
        source: MountSource::Image,
        target: root.clone(),
        filesystem_kind: Some("squashfs"),
        flags: MsFlags::MS_RDONLY | MsFlags::MS_NODEV | MsFlags::MS_NOSUID,
        data: None,
        is_removable: true,
    }];

    let mut seen = HashSet::new();
    let mut pseudo: Vec<PseudoFilesystem> = spec
        .pseudo_filesystems
        .iter()
        .copied()
        .filter(|fs| seen.insert(*fs))
        .collect();
    // Parents before children: /dev must not cover an earlier /dev/shm.
    pseudo.sort_by_key(|fs| Path::new(fs.container_path()).components().count());
    operations.extend(pseudo.into_iter().map(|fs| pseudo_operation(&root, fs)));

    for bind in &spec.bind_mounts {
        operations.extend(bind_operations(&root, bind));
    }

    for op in &operations {
        ensure_contained(&root, &op.target)?;
    }

    Ok(MountPlan { root, operations })
}

fn pseudo_operation(root: &Path, fs: PseudoFilesystem) -> MountOperation {
    let hardened = MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC;
    let (source, filesystem_kind, flags, data) = match fs {
        PseudoFilesystem::Proc => (MountSource::Named("proc"), Some("proc"), hardened, None),
        PseudoFilesystem::Sys => (
            MountSource::Named("sysfs"),
            Some("sysfs"),
            hardened | MsFlags::MS_RDONLY,
            None,
        ),
        PseudoFilesystem::Dev => (
            MountSource::Path(PathBuf::from("/dev")),
            None,
            MsFlags::MS_BIND | MsFlags::MS_REC,
            None,
        ),
        PseudoFilesystem::DevPts => (
            MountSource::Named("devpts"),
            Some("devpts"),
            MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC,
            Some("newinstance,ptmxmode=0666,mode=0620"),
        ),
        PseudoFilesystem::Shm => (
            MountSource::Named("shm"),
            Some("tmpfs"),
            MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
            Some("mode=1777"),
        ),
        PseudoFilesystem::Mqueue => (MountSource::Named("mqueue"), Some("mqueue"), hardened, None),
    };
    MountOperation {
        source,
        target: inside(root, Path::new(fs.container_path())),
        filesystem_kind,
        flags,
        data,
        is_removable: true,
    }
}

fn bind_operations(root: &Path, bind: &BindMount) -> Vec<MountOperation> {
    let target = inside(root, &bind.target);
    let mut ops = vec![MountOperation {
        source: MountSource::Path(bind.source.clone()),
        target: target.clone(),
        filesystem_kind: None,
        flags: MsFlags::MS_BIND | MsFlags::MS_REC,
        data: None,
        is_removable: true,
    }];
    // A bind ignores MS_RDONLY; read-only takes a second, in-place remount.
    if bind.readonly {
        ops.push(MountOperation {
            source: MountSource::None,
            target,
            filesystem_kind: None,
            flags: MsFlags::MS_REMOUNT | MsFlags::MS_BIND | MsFlags::MS_RDONLY,
            data: None,
            is_removable: false,
        });
    }
    ops
}

/// Maps an absolute container path to its host path under `root`.
fn inside(root: &Path, container_path: &Path) -> PathBuf {
    root.join(container_path.strip_prefix("/").unwrap_or(container_path))
}

fn ensure_contained(root: &Path, target: &Path) -> Result<()> {
    let escapes = target
        .components()
        .any(|c| matches!(c, Component::ParentDir));
    if escapes || !target.starts_with(root) {
        return Err(LaunchError::MalformedMountPlan {
            target: target.to_path_buf(),
            root: root.to_path_buf(),
        });
    }
    Ok(())
}
