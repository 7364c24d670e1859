//! `--print-plan`: show what a launch would do without doing it.

use std::process::ExitCode;

use snow_common::types::ContainerSpec;
use snow_core::filesystem::plan::build_plan;

/// Prints the namespaces and mount plan for `spec`.
///
/// Validates the artifact first so the plan reflects a launchable image,
/// but issues no privileged call.
pub fn execute(spec: &ContainerSpec) -> ExitCode {
    let result = snow_image::artifact::validate_artifact(&spec.image)
        .and_then(|info| build_plan(spec).map(|plan| (info, plan)));
    match result {
        Ok((info, plan)) => {
            crate::output::print_plan(spec, &info, &plan);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let code = err.exit_code();
            crate::output::print_error(&err.into());
            ExitCode::from(code)
        }
    }
}
