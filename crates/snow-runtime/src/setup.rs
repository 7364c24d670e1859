//! Builds the isolated environment: namespaces, mounts, and the root switch.
//!
//! Every acquisition is pushed onto the caller's [`ResourceStack`] the
//! moment it succeeds, so a failure at any step leaves the stack holding
//! exactly what must be released.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use snow_common::error::{LaunchError, Result};
use snow_common::types::{ContainerSpec, NamespaceKind};
use snow_core::filesystem::loopdev::LoopDevice;
use snow_core::filesystem::plan::{MountOperation, MountPlan, MountSource};
use snow_core::host::Host;

use crate::teardown::{AcquiredResource, ResourceStack};

fn namespace_failed(kind: NamespaceKind, errno: Errno) -> LaunchError {
    LaunchError::NamespaceCreationFailed {
        kind,
        source: errno.into(),
    }
}

fn mount_failed(op: &MountOperation, errno: Errno) -> LaunchError {
    LaunchError::MountFailed {
        operation: op.to_string(),
        source: errno.into(),
    }
}

fn root_switch_failed(stage: &'static str, errno: Errno) -> LaunchError {
    LaunchError::RootSwitchFailed {
        stage,
        source: errno.into(),
    }
}

/// Fails with `Interrupted` if a termination signal is waiting.
///
/// # Errors
///
/// Returns `LaunchError::Interrupted` carrying the signal number.
pub fn check_interrupted<H: Host + ?Sized>(host: &H) -> Result<()> {
    match host.pending_termination() {
        Some(signal) => {
            tracing::info!(signal, "termination signal received during setup");
            Err(LaunchError::Interrupted { signal })
        }
        None => Ok(()),
    }
}

/// Runs the whole setup sequence for `spec` following `plan`.
///
/// On success the process is inside the new namespaces with the image as
/// its root and `spec.workdir` as its working directory.
///
/// # Errors
///
/// Returns the error of the first failing step. Resources acquired before
/// the failure remain on `stack`.
pub fn setup<H: Host + ?Sized>(
    host: &mut H,
    plan: &MountPlan,
    spec: &ContainerSpec,
    stack: &mut ResourceStack,
) -> Result<()> {
    enter_namespaces(host, spec, stack)?;
    let device = attach_image(host, plan, spec, stack)?;
    apply_mounts(host, plan, device.as_deref(), stack)?;
    switch_root(host, plan, &spec.workdir, stack)
}

fn enter_namespaces<H: Host + ?Sized>(
    host: &mut H,
    spec: &ContainerSpec,
    stack: &mut ResourceStack,
) -> Result<()> {
    for kind in spec.namespaces.kinds() {
        check_interrupted(host)?;
        let saved = host
            .enter_namespace(kind)
            .map_err(|e| namespace_failed(kind, e))?;
        stack.push(AcquiredResource::Namespace(saved));
    }

    host.make_mounts_private()
        .map_err(|e| namespace_failed(NamespaceKind::Mount, e))?;

    if spec.namespaces.contains(NamespaceKind::Uts)
        && let Some(hostname) = spec.hostname.as_deref()
    {
        host.set_hostname(hostname)
            .map_err(|e| namespace_failed(NamespaceKind::Uts, e))?;
    }
    Ok(())
}

/// Attaches the loop device and returns its node path.
fn attach_image<H: Host + ?Sized>(
    host: &mut H,
    plan: &MountPlan,
    spec: &ContainerSpec,
    stack: &mut ResourceStack,
) -> Result<Option<PathBuf>> {
    let Some(image_op) = plan
        .operations()
        .iter()
        .find(|op| op.source == MountSource::Image)
    else {
        return Ok(None);
    };
    check_interrupted(host)?;
    let device: LoopDevice = host
        .attach_loop(&spec.image)
        .map_err(|e| mount_failed(image_op, e))?;
    let path = device.path().to_path_buf();
    tracing::info!(image = %spec.image, device = %path.display(), "image attached");
    stack.push(AcquiredResource::LoopDevice(device));
    Ok(Some(path))
}

fn apply_mounts<H: Host + ?Sized>(
    host: &mut H,
    plan: &MountPlan,
    device: Option<&Path>,
    stack: &mut ResourceStack,
) -> Result<()> {
    for op in plan.operations() {
        check_interrupted(host)?;
        if op.target != plan.root() {
            host.verify_mount_target(plan.root(), &op.target)
                .map_err(|e| match e {
                    Errno::ELOOP | Errno::EXDEV => LaunchError::MalformedMountPlan {
                        target: op.target.clone(),
                        root: plan.root().to_path_buf(),
                    },
                    e => mount_failed(op, e),
                })?;
        }
        let source = match &op.source {
            MountSource::Image => device,
            MountSource::Path(path) => Some(path.as_path()),
            MountSource::Named(name) => Some(Path::new(name)),
            MountSource::None => None,
        };
        host.mount(source, op).map_err(|e| mount_failed(op, e))?;
        if op.is_removable {
            stack.push(AcquiredResource::Mount(op.target.clone()));
        }
    }
    Ok(())
}

fn switch_root<H: Host + ?Sized>(
    host: &mut H,
    plan: &MountPlan,
    workdir: &Path,
    stack: &mut ResourceStack,
) -> Result<()> {
    check_interrupted(host)?;
    host.pivot_root(plan.root())
        .map_err(|e| root_switch_failed("pivot_root", e))?;
    stack.rebase_mounts(plan.root());
    host.detach_old_root()
        .map_err(|e| root_switch_failed("detach old root", e))?;
    host.chdir(workdir)
        .map_err(|e| root_switch_failed("chdir", e))?;
    tracing::debug!(workdir = %workdir.display(), "setup complete");
    Ok(())
}
