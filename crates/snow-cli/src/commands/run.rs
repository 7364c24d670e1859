//! Default action: launch the target inside the image.

use std::process::ExitCode;

use snow_common::types::ContainerSpec;
use snow_core::host::LinuxHost;
use snow_runtime::launcher;

/// Launches `spec`. Returns only if the target was not started.
pub fn execute(spec: &ContainerSpec) -> ExitCode {
    let mut host = match LinuxHost::new() {
        Ok(host) => host,
        Err(errno) => {
            crate::output::print_error(&anyhow::anyhow!("cannot block termination signals: {errno}"));
            return ExitCode::from(snow_common::constants::EXIT_CONFIG);
        }
    };
    tracing::info!(
        image = %spec.image,
        target = %spec.target_executable.display(),
        "launching"
    );
    let failure = launcher::launch(&mut host, spec);
    crate::output::print_failure(&failure);
    ExitCode::from(failure.exit_code())
}
