//! Reverse-order release of everything a launch acquired.
//!
//! Setup pushes one [`AcquiredResource`] per successful acquisition onto a
//! [`ResourceStack`]. The stack is owned by a [`TeardownGuard`], which pops
//! and releases every entry when finished or dropped. Popping guarantees
//! each entry is released at most once.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use snow_common::error::TeardownWarning;
use snow_core::filesystem::loopdev::LoopDevice;
use snow_core::host::Host;
use snow_core::namespace::SavedNamespace;

/// A kernel resource acquired during setup.
#[derive(Debug)]
pub enum AcquiredResource {
    /// The namespace that was current before `unshare(2)`.
    Namespace(SavedNamespace),
    /// A loop device bound to the image.
    LoopDevice(LoopDevice),
    /// A mounted target.
    Mount(PathBuf),
}

impl fmt::Display for AcquiredResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace(saved) => write!(f, "{} namespace", saved.kind()),
            Self::LoopDevice(device) => write!(f, "loop device {}", device.path().display()),
            Self::Mount(target) => write!(f, "mount {}", target.display()),
        }
    }
}

/// Resources in acquisition order.
#[derive(Debug, Default)]
pub struct ResourceStack {
    entries: Vec<AcquiredResource>,
}

impl ResourceStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records a newly acquired resource.
    pub fn push(&mut self, resource: AcquiredResource) {
        tracing::trace!(resource = %resource, "resource acquired");
        self.entries.push(resource);
    }

    /// Number of resources not yet released.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the held resources, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AcquiredResource> {
        self.entries.iter()
    }

    /// Rewrites mount targets after the root moved to `old_root`.
    ///
    /// A target at `old_root/x` is reachable as `/x` once the root has been
    /// switched, and `old_root` itself becomes `/`.
    pub fn rebase_mounts(&mut self, old_root: &Path) {
        for entry in &mut self.entries {
            if let AcquiredResource::Mount(target) = entry
                && let Ok(relative) = target.strip_prefix(old_root)
            {
                let mut rebased = PathBuf::from(Component::RootDir.as_os_str());
                rebased.push(relative);
                *target = rebased;
            }
        }
    }

    fn pop(&mut self) -> Option<AcquiredResource> {
        self.entries.pop()
    }
}

/// Outcome of a teardown.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Resources released without error.
    pub released: usize,
    /// Resources whose release failed.
    pub warnings: Vec<TeardownWarning>,
}

impl TeardownReport {
    /// Whether every resource was released cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Owns the [`ResourceStack`] of a launch and releases it on every exit path.
///
/// Call [`finish`](Self::finish) to release explicitly and collect the
/// [`TeardownReport`]. A guard dropped without finishing releases anyway and
/// logs the warnings.
pub struct TeardownGuard<'h, H: Host + ?Sized> {
    host: &'h mut H,
    stack: ResourceStack,
}

impl<'h, H: Host + ?Sized> TeardownGuard<'h, H> {
    /// Starts guarding an empty stack on `host`.
    pub const fn new(host: &'h mut H) -> Self {
        Self {
            host,
            stack: ResourceStack::new(),
        }
    }

    /// Splits the guard into the host and the stack for setup to use.
    pub fn parts(&mut self) -> (&mut H, &mut ResourceStack) {
        (&mut *self.host, &mut self.stack)
    }

    /// Resources currently held.
    #[must_use]
    pub const fn stack(&self) -> &ResourceStack {
        &self.stack
    }

    /// Releases every held resource, newest first.
    pub fn finish(mut self) -> TeardownReport {
        self.release_all()
    }

    fn release_all(&mut self) -> TeardownReport {
        let mut report = TeardownReport::default();
        if self.stack.is_empty() {
            return report;
        }
        tracing::debug!(held = self.stack.len(), "tearing down");
        while let Some(resource) = self.stack.pop() {
            let name = resource.to_string();
            let result = match resource {
                AcquiredResource::Mount(target) => self.host.unmount(&target),
                AcquiredResource::LoopDevice(device) => self.host.detach_loop(device),
                AcquiredResource::Namespace(saved) => self.host.restore_namespace(saved),
            };
            match result {
                Ok(()) => {
                    tracing::debug!(resource = %name, "released");
                    report.released += 1;
                }
                Err(errno) => {
                    tracing::warn!(resource = %name, error = %errno, "release failed");
                    report.warnings.push(TeardownWarning {
                        resource: name,
                        source: errno.into(),
                    });
                }
            }
        }
        report
    }
}

impl<H: Host + ?Sized> Drop for TeardownGuard<'_, H> {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}

impl<H: Host + ?Sized> fmt::Debug for TeardownGuard<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeardownGuard")
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}
