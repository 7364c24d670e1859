//! Human-readable output for the CLI.
//!
//! Errors and teardown warnings go to stderr; only `--print-plan` writes
//! to stdout.

use std::fmt::Write as _;

use snow_common::constants::APP_NAME;
use snow_common::types::ContainerSpec;
use snow_core::filesystem::plan::MountPlan;
use snow_image::artifact::ImageInfo;
use snow_runtime::launcher::LaunchFailure;

/// Formats `err` with its cause chain as `snow: <error>: <cause>`.
#[must_use]
pub fn format_error(err: &anyhow::Error) -> String {
    format!("{APP_NAME}: {err:#}")
}

/// Prints an error to stderr.
#[allow(clippy::print_stderr)]
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{}", format_error(err));
}

/// Lines describing a failed launch: the error, then each teardown warning.
#[must_use]
pub fn failure_lines(failure: &LaunchFailure) -> Vec<String> {
    let mut lines = vec![format!("{APP_NAME}: {}", failure.error)];
    lines.extend(
        failure
            .teardown
            .warnings
            .iter()
            .map(|warning| format!("{APP_NAME}: warning: {warning}")),
    );
    lines
}

/// Prints a failed launch to stderr.
#[allow(clippy::print_stderr)]
pub fn print_failure(failure: &LaunchFailure) {
    for line in failure_lines(failure) {
        eprintln!("{line}");
    }
}

/// Renders the plan as printed by `--print-plan`.
#[must_use]
pub fn render_plan(spec: &ContainerSpec, info: &ImageInfo, plan: &MountPlan) -> String {
    let mut out = String::new();
    let namespaces: Vec<String> = spec.namespaces.kinds().iter().map(ToString::to_string).collect();
    let _ = writeln!(
        out,
        "image:      {} (squashfs {}.{}, {:?}, {} bytes)",
        info.location, info.version.0, info.version.1, info.compression, info.bytes_used
    );
    let _ = writeln!(out, "namespaces: {}", namespaces.join(", "));
    if let Some(hostname) = spec.hostname.as_deref().filter(|_| spec.namespaces.uts) {
        let _ = writeln!(out, "hostname:   {hostname}");
    }
    let _ = writeln!(out, "root:       {}", plan.root().display());
    let _ = writeln!(out, "mounts:");
    for (index, op) in plan.operations().iter().enumerate() {
        let _ = writeln!(out, "  {:>2}. {op}", index + 1);
    }
    let mut argv = vec![spec.target_executable.display().to_string()];
    argv.extend(spec.forwarded_args.iter().map(|arg| format!("{arg:?}")));
    let _ = writeln!(out, "workdir:    {}", spec.workdir.display());
    let _ = writeln!(out, "exec:       {}", argv.join(" "));
    out
}

/// Prints the plan to stdout.
#[allow(clippy::print_stdout)]
pub fn print_plan(spec: &ContainerSpec, info: &ImageInfo, plan: &MountPlan) {
    print!("{}", render_plan(spec, info, plan));
}

#[cfg(test)]
mod tests {
    use snow_common::error::{LaunchError, TeardownWarning};
    use snow_common::types::ImageLocation;
    use snow_core::filesystem::plan::build_plan;
    use snow_image::artifact::Compression;
    use snow_runtime::teardown::TeardownReport;

    use super::*;

    #[test]
    fn failure_lists_error_then_warnings() {
        let failure = LaunchFailure {
            error: LaunchError::Interrupted { signal: 2 },
            teardown: TeardownReport {
                released: 3,
                warnings: vec![TeardownWarning {
                    resource: "mount /proc/self/fd".into(),
                    source: std::io::Error::from(std::io::ErrorKind::ResourceBusy),
                }],
            },
        };
        let lines = failure_lines(&failure);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("snow: "));
        assert!(lines[1].contains("failed to release mount /proc/self/fd"));
    }

    #[test]
    fn error_chain_is_flattened() {
        let err = anyhow::anyhow!("inner").context("loading /etc/snow/config.json");
        assert_eq!(format_error(&err), "snow: loading /etc/snow/config.json: inner");
    }

    #[test]
    fn plan_lists_every_mount_in_order() {
        let mut spec = ContainerSpec::new(ImageLocation::new("/img.squashfs"), "/bin/sh");
        spec.forwarded_args = vec!["-c".into(), "echo hi".into()];
        let plan = build_plan(&spec).unwrap();
        let info = ImageInfo {
            location: spec.image.clone(),
            bytes_used: 4096,
            block_size: 131_072,
            compression: Compression::Xz,
            version: (4, 0),
        };
        let text = render_plan(&spec, &info, &plan);
        assert!(text.contains("namespaces: mount, uts, ipc"), "{text}");
        assert!(text.contains(" 1. squashfs <image> on /proc/self/fd (ro)"), "{text}");
        assert!(text.contains("exec:       /bin/sh \"-c\" \"echo hi\""), "{text}");
        assert_eq!(
            text.lines().filter(|l| l.trim_start().starts_with(char::is_numeric)).count(),
            plan.operations().len()
        );
    }
}
