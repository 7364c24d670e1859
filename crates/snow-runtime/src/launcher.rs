//! The launch sequence.
//!
//! Validator, privilege guard, and plan builder run first and hold nothing.
//! Setup and hand-off then run inside a [`TeardownGuard`], so every
//! acquisition is released on any failure before `execve(2)` succeeds.

use std::ffi::OsString;

use snow_common::error::LaunchError;
use snow_common::types::ContainerSpec;
use snow_core::capability::check_privileges;
use snow_core::filesystem::plan::build_plan;
use snow_core::host::Host;
use snow_image::artifact::validate_artifact;
use snow_image::hash::verify_digest;

use crate::exec::{self, PreparedExec};
use crate::setup::{self, check_interrupted};
use crate::teardown::{TeardownGuard, TeardownReport};

/// A launch that did not reach the target.
#[derive(Debug)]
pub struct LaunchFailure {
    /// What stopped the launch.
    pub error: LaunchError,
    /// What teardown released and what it could not.
    pub teardown: TeardownReport,
}

impl LaunchFailure {
    fn before_setup(error: LaunchError) -> Self {
        Self {
            error,
            teardown: TeardownReport::default(),
        }
    }

    /// Process exit code for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.error.exit_code()
    }
}

/// Runs `spec` with the launcher's own environment as the inherited one.
///
/// Returns only if the target was not started.
pub fn launch<H: Host + ?Sized>(host: &mut H, spec: &ContainerSpec) -> LaunchFailure {
    launch_with_env(host, spec, std::env::vars_os())
}

/// Runs `spec`, building the target's environment from `inherited`.
///
/// Returns only if the target was not started.
pub fn launch_with_env<H, I>(host: &mut H, spec: &ContainerSpec, inherited: I) -> LaunchFailure
where
    H: Host + ?Sized,
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let prepared = match preflight(host, spec, inherited) {
        Ok(prepared) => prepared,
        Err(error) => return LaunchFailure::before_setup(error),
    };
    let plan = match build_plan(spec) {
        Ok(plan) => plan,
        Err(error) => return LaunchFailure::before_setup(error),
    };
    tracing::debug!(
        root = %plan.root().display(),
        operations = plan.operations().len(),
        "mount plan built"
    );

    let mut guard = TeardownGuard::new(host);
    let error = {
        let (host, stack) = guard.parts();
        match setup::setup(host, &plan, spec, stack).and_then(|()| check_interrupted(host)) {
            Ok(()) => exec::hand_off(host, spec, &prepared),
            Err(error) => error,
        }
    };
    tracing::debug!(error = %error, "launch failed, tearing down");
    let teardown = guard.finish();
    LaunchFailure { error, teardown }
}

fn preflight<H, I>(host: &H, spec: &ContainerSpec, inherited: I) -> Result<PreparedExec, LaunchError>
where
    H: Host + ?Sized,
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let info = validate_artifact(&spec.image)?;
    if let Some(expected) = &spec.image_sha256 {
        verify_digest(&spec.image, expected)?;
    }
    tracing::info!(
        image = %info.location,
        bytes_used = info.bytes_used,
        "image accepted"
    );
    check_privileges(host)?;
    exec::prepare(spec, inherited)
}
