//! CLI definition and dispatch.

pub mod plan;
pub mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use snow_common::config::LauncherConfig;
use snow_common::constants;
use snow_common::error::LaunchError;
use snow_common::types::{BindMount, ContainerSpec, EnvAction, PseudoFilesystem, Sha256Hash};

/// snow: run one program inside a squashfs image, no daemon required.
#[derive(Parser, Debug)]
#[command(name = "snow", version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file [default: /etc/snow/config.json if present].
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Squashfs image to use as the root filesystem.
    #[arg(long, value_name = "PATH", conflicts_with = "embedded_section")]
    pub image: Option<PathBuf>,

    /// Byte offset of the squashfs inside the image file.
    #[arg(long, value_name = "BYTES")]
    pub image_offset: Option<u64>,

    /// Use the image embedded in this executable's ELF section NAME.
    #[arg(long, value_name = "NAME")]
    pub embedded_section: Option<String>,

    /// Executable to start inside the image.
    #[arg(long, value_name = "PATH")]
    pub target: Option<PathBuf>,

    /// Hostname inside the new UTS namespace.
    #[arg(long, value_name = "NAME")]
    pub hostname: Option<String>,

    /// Create a network namespace (loopback only).
    #[arg(long)]
    pub net: bool,

    /// Create a PID namespace for the target's children.
    #[arg(long)]
    pub pid: bool,

    /// Share the host IPC namespace.
    #[arg(long)]
    pub no_ipc: bool,

    /// Share the host UTS namespace and hostname.
    #[arg(long)]
    pub no_uts: bool,

    /// Host directory the image is mounted on before the root switch.
    #[arg(long, value_name = "DIR")]
    pub mount_point: Option<PathBuf>,

    /// Working directory inside the image.
    #[arg(long, value_name = "DIR")]
    pub workdir: Option<PathBuf>,

    /// Pseudo-filesystems to mount, replacing the configured list.
    #[arg(long = "fs", value_name = "KIND", value_delimiter = ',')]
    pub pseudo_filesystems: Vec<PseudoFilesystem>,

    /// Bind a host path into the image (repeatable).
    #[arg(long = "bind", value_name = "SRC[:DST][:ro]")]
    pub binds: Vec<BindMount>,

    /// Bind the host's resolv.conf, hosts, and hostname read-only.
    #[arg(long)]
    pub share_network_config: bool,

    /// Set NAME=VALUE, or pass NAME through, in the target's environment.
    #[arg(long = "env", value_name = "NAME[=VALUE]")]
    pub env: Vec<String>,

    /// Remove NAME from the target's environment.
    #[arg(long = "unset", value_name = "NAME")]
    pub unset: Vec<String>,

    /// Start the target with only the variables named by --env.
    #[arg(long)]
    pub clear_env: bool,

    /// Expected SHA-256 of the image region.
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Print the mount plan and exit without touching the system.
    #[arg(long)]
    pub print_plan: bool,

    /// Arguments passed verbatim to the target.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

impl Cli {
    /// Loads the configuration file and applies the flags on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or a flag is invalid.
    pub fn load_config(&self) -> anyhow::Result<LauncherConfig> {
        let config = match &self.config {
            Some(path) => LauncherConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => LauncherConfig::load_default()
                .with_context(|| format!("loading {}", constants::DEFAULT_CONFIG_FILE))?,
        };
        self.apply(config)
    }

    /// Overrides `config` with every flag that was given.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Config` for a malformed digest or `--env` entry.
    pub fn apply(&self, mut config: LauncherConfig) -> anyhow::Result<LauncherConfig> {
        if let Some(image) = &self.image {
            config.image = Some(image.clone());
            config.embedded_section = None;
        }
        if let Some(section) = &self.embedded_section {
            config.embedded_section = Some(section.clone());
            config.image = None;
        }
        if let Some(offset) = self.image_offset {
            config.image_offset = offset;
        }
        if let Some(target) = &self.target {
            config.target = target.clone();
        }
        if let Some(hostname) = &self.hostname {
            config.hostname = Some(hostname.clone());
        }
        config.namespaces.network |= self.net;
        config.namespaces.pid |= self.pid;
        if self.no_ipc {
            config.namespaces.ipc = false;
        }
        if self.no_uts {
            config.namespaces.uts = false;
        }
        if let Some(dir) = &self.mount_point {
            config.mount_point = dir.clone();
        }
        if let Some(dir) = &self.workdir {
            config.workdir = dir.clone();
        }
        if !self.pseudo_filesystems.is_empty() {
            config.pseudo_filesystems = self.pseudo_filesystems.clone();
        }
        config.bind_mounts.extend(self.binds.iter().cloned());
        config.share_network_config |= self.share_network_config;

        let policy = &mut config.environment;
        policy.clear_unlisted |= self.clear_env;
        for entry in &self.env {
            let (name, action) = match entry.split_once('=') {
                Some((name, value)) => (name, EnvAction::Override(value.to_string())),
                None => (entry.as_str(), EnvAction::PassThrough),
            };
            if name.is_empty() {
                return Err(LaunchError::Config {
                    message: format!("invalid --env `{entry}`, expected NAME[=VALUE]"),
                }
                .into());
            }
            let _ = policy.set(name, action);
        }
        for name in &self.unset {
            let _ = policy.set(name.as_str(), EnvAction::Drop);
        }

        if let Some(hex) = &self.sha256 {
            config.image_sha256 = Some(Sha256Hash::from_hex(hex.as_str())?);
        }
        Ok(config)
    }

    /// Forwarded arguments, or `None` to fall back to the configured ones.
    #[must_use]
    pub fn forwarded_args(&self) -> Option<Vec<String>> {
        (!self.args.is_empty()).then(|| self.args.clone())
    }

    /// Resolves the image and builds the final [`ContainerSpec`].
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the image cannot be located.
    pub fn container_spec(&self) -> anyhow::Result<ContainerSpec> {
        let config = self.load_config()?;
        let source = config.image_source()?;
        let image = snow_image::embedded::resolve(&source)?;
        Ok(config.into_spec(image, self.forwarded_args()))
    }
}

/// Exit code for an error surfaced through `anyhow`.
#[must_use]
pub fn exit_code_of(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<LaunchError>()
        .map_or(constants::EXIT_CONFIG, LaunchError::exit_code)
}

/// Dispatches the parsed command line.
pub fn execute(cli: &Cli) -> ExitCode {
    let spec = match cli.container_spec() {
        Ok(spec) => spec,
        Err(err) => {
            crate::output::print_error(&err);
            return ExitCode::from(exit_code_of(&err));
        }
    };
    if cli.print_plan {
        plan::execute(&spec)
    } else {
        run::execute(&spec)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("snow").chain(args.iter().copied())).expect("parse")
    }

    #[test]
    fn trailing_arguments_after_separator_are_forwarded() {
        let cli = parse(&["--image", "/img.sqfs", "--", "-c", "echo hi"]);
        assert_eq!(cli.args, ["-c", "echo hi"]);
        assert_eq!(cli.forwarded_args(), Some(vec!["-c".into(), "echo hi".into()]));
    }

    #[test]
    fn unknown_dash_argument_starts_forwarded_list() {
        let cli = parse(&["-c", "exit 7"]);
        assert_eq!(cli.args, ["-c", "exit 7"]);
    }

    #[test]
    fn no_trailing_arguments_defers_to_config() {
        assert_eq!(parse(&[]).forwarded_args(), None);
    }

    #[test]
    fn image_and_embedded_section_conflict() {
        let result = Cli::try_parse_from(["snow", "--image", "/a", "--embedded-section", ".sq"]);
        assert!(result.is_err());
    }

    #[test]
    fn flags_override_configuration() {
        let cli = parse(&[
            "--image",
            "/srv/app.squashfs",
            "--image-offset",
            "4096",
            "--target",
            "/usr/bin/app",
            "--net",
            "--no-uts",
            "--bind",
            "/srv/data:/data:ro",
            "--fs",
            "proc,dev",
            "--workdir",
            "/data",
        ]);
        let config = cli.apply(LauncherConfig::default()).expect("apply");
        assert_eq!(config.image.as_deref(), Some(Path::new("/srv/app.squashfs")));
        assert_eq!(config.image_offset, 4096);
        assert_eq!(config.target, Path::new("/usr/bin/app"));
        assert!(config.namespaces.network);
        assert!(!config.namespaces.uts);
        assert!(config.namespaces.ipc);
        assert_eq!(config.bind_mounts.len(), 1);
        assert!(config.bind_mounts[0].readonly);
        assert_eq!(
            config.pseudo_filesystems,
            [PseudoFilesystem::Proc, PseudoFilesystem::Dev]
        );
        assert_eq!(config.workdir, Path::new("/data"));
    }

    #[test]
    fn embedded_section_flag_replaces_configured_image() {
        let cli = parse(&["--embedded-section", ".rootfs"]);
        let config = LauncherConfig {
            image: Some("/from/config.squashfs".into()),
            ..LauncherConfig::default()
        };
        let config = cli.apply(config).expect("apply");
        assert_eq!(config.image, None);
        assert_eq!(config.embedded_section.as_deref(), Some(".rootfs"));
    }

    #[test]
    fn environment_flags_build_policy() {
        let cli = parse(&[
            "--env",
            "LANG=C",
            "--env",
            "TERM",
            "--unset",
            "SSH_AUTH_SOCK",
            "--clear-env",
        ]);
        let config = cli.apply(LauncherConfig::default()).expect("apply");
        let policy = &config.environment;
        assert!(policy.clear_unlisted);
        assert_eq!(policy.action("LANG"), Some(&EnvAction::Override("C".into())));
        assert_eq!(policy.action("TERM"), Some(&EnvAction::PassThrough));
        assert_eq!(policy.action("SSH_AUTH_SOCK"), Some(&EnvAction::Drop));
    }

    #[test]
    fn empty_env_name_is_config_error() {
        let cli = parse(&["--env", "=oops"]);
        let err = cli.apply(LauncherConfig::default()).unwrap_err();
        assert_eq!(exit_code_of(&err), constants::EXIT_CONFIG);
    }

    #[test]
    fn bad_digest_is_rejected() {
        let cli = parse(&["--sha256", "not-hex"]);
        assert!(cli.apply(LauncherConfig::default()).is_err());
    }

    #[test]
    fn missing_config_file_maps_to_config_exit_code() {
        let cli = parse(&["--config", "/nonexistent/snow.json"]);
        let err = cli.load_config().unwrap_err();
        assert_eq!(exit_code_of(&err), constants::EXIT_CONFIG);
        assert!(format!("{err:#}").contains("/nonexistent/snow.json"));
    }

    #[test]
    fn invalid_bind_is_a_usage_error() {
        assert!(Cli::try_parse_from(["snow", "--bind", "/a:relative"]).is_err());
    }
}
