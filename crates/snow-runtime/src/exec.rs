//! Target process preparation and hand-off.
//!
//! argv and envp are built as `CString`s before any privileged step so that
//! an invalid argument fails the launch while nothing is held yet.

use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStringExt;

use snow_common::error::{LaunchError, Result};
use snow_common::types::{ContainerSpec, EnvAction, EnvironmentPolicy};
use snow_core::host::Host;

/// argv and envp ready for `execve(2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedExec {
    /// Executable path inside the new root.
    pub path: CString,
    /// Argument vector; `argv[0]` is the executable path.
    pub argv: Vec<CString>,
    /// Environment as `NAME=VALUE` entries.
    pub envp: Vec<CString>,
}

fn nul_error(spec: &ContainerSpec, what: &str) -> LaunchError {
    LaunchError::ExecFailed {
        target: spec.target_executable.clone(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{what} contains an interior NUL byte"),
        ),
    }
}

/// Builds `[target_executable] ++ forwarded_args`, unchanged.
///
/// # Errors
///
/// Returns `LaunchError::ExecFailed` if any element contains a NUL byte.
pub fn build_argv(spec: &ContainerSpec) -> Result<Vec<CString>> {
    let program = CString::new(spec.target_executable.as_os_str().to_owned().into_vec())
        .map_err(|_| nul_error(spec, "target path"))?;
    let mut argv = Vec::with_capacity(spec.forwarded_args.len() + 1);
    argv.push(program);
    for arg in &spec.forwarded_args {
        argv.push(CString::new(arg.as_bytes()).map_err(|_| nul_error(spec, "argument"))?);
    }
    Ok(argv)
}

/// Applies `policy` to the inherited environment.
///
/// Inherited variables keep their order. Overrides for variables that were
/// not inherited are appended in name order.
///
/// # Errors
///
/// Returns `LaunchError::ExecFailed` (against `spec`'s target) if a variable
/// contains a NUL byte.
pub fn build_environment<I>(
    spec: &ContainerSpec,
    inherited: I,
    policy: &EnvironmentPolicy,
) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut entries: Vec<Vec<u8>> = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for (name, value) in inherited {
        let name_str = name.to_string_lossy().into_owned();
        let value = match policy.action(&name_str) {
            Some(EnvAction::Drop) => None,
            Some(EnvAction::Override(replacement)) => Some(replacement.clone().into_bytes()),
            Some(EnvAction::PassThrough) => Some(value.into_vec()),
            None if policy.clear_unlisted => None,
            None => Some(value.into_vec()),
        };
        let _ = seen.insert(name_str);
        if let Some(value) = value {
            entries.push(join_entry(name.into_vec(), &value));
        }
    }

    for (name, action) in &policy.rules {
        if let EnvAction::Override(value) = action
            && !seen.contains(name)
        {
            entries.push(join_entry(name.clone().into_bytes(), value.as_bytes()));
        }
    }

    entries
        .into_iter()
        .map(|entry| CString::new(entry).map_err(|_| nul_error(spec, "environment variable")))
        .collect()
}

fn join_entry(mut name: Vec<u8>, value: &[u8]) -> Vec<u8> {
    name.push(b'=');
    name.extend_from_slice(value);
    name
}

/// Builds argv and envp for `spec` from the launcher's own environment.
///
/// # Errors
///
/// Returns `LaunchError::ExecFailed` if argv or envp contains a NUL byte.
pub fn prepare<I>(spec: &ContainerSpec, inherited: I) -> Result<PreparedExec>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let argv = build_argv(spec)?;
    let envp = build_environment(spec, inherited, &spec.environment_policy)?;
    Ok(PreparedExec {
        path: argv[0].clone(),
        argv,
        envp,
    })
}

/// Replaces the launcher with the target. Returns only on failure.
pub fn hand_off<H: Host + ?Sized>(
    host: &mut H,
    spec: &ContainerSpec,
    prepared: &PreparedExec,
) -> LaunchError {
    tracing::info!(
        target = %spec.target_executable.display(),
        args = prepared.argv.len() - 1,
        "handing off"
    );
    let errno = host.exec(&prepared.path, &prepared.argv, &prepared.envp);
    LaunchError::ExecFailed {
        target: spec.target_executable.clone(),
        source: errno.into(),
    }
}
