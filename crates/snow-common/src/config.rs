//! Launcher configuration model.
//!
//! Loaded from a JSON file (by default [`DEFAULT_CONFIG_FILE`]) and then
//! overridden by command-line flags before being frozen into a
//! [`ContainerSpec`].
//!
//! [`DEFAULT_CONFIG_FILE`]: crate::constants::DEFAULT_CONFIG_FILE

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{LaunchError, Result};
use crate::types::{
    BindMount, ContainerSpec, EnvironmentPolicy, ImageLocation, NamespaceSet, PseudoFilesystem,
    Sha256Hash,
};

/// Root configuration for the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
    /// Image file. Mutually exclusive with `embedded_section`.
    pub image: Option<PathBuf>,
    /// Byte offset of the squashfs inside `image`.
    pub image_offset: u64,
    /// ELF section of the launcher executable that holds the image.
    pub embedded_section: Option<String>,
    /// Expected SHA-256 of the image region.
    pub image_sha256: Option<Sha256Hash>,
    /// Executable started inside the container.
    pub target: PathBuf,
    /// Arguments used when the command line forwards none.
    pub args: Vec<String>,
    /// Hostname for a fresh UTS namespace; `None` keeps the inherited one.
    pub hostname: Option<String>,
    /// Namespaces to create.
    pub namespaces: NamespaceSet,
    /// Host directory the image is mounted on.
    pub mount_point: PathBuf,
    /// Pseudo-filesystems mounted inside the root.
    pub pseudo_filesystems: Vec<PseudoFilesystem>,
    /// Extra bind mounts.
    pub bind_mounts: Vec<BindMount>,
    /// Bind the host's resolver, hosts, and hostname files read-only.
    pub share_network_config: bool,
    /// Environment filtering rules for the target.
    pub environment: EnvironmentPolicy,
    /// Working directory inside the new root.
    pub workdir: PathBuf,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            image: None,
            image_offset: 0,
            embedded_section: None,
            image_sha256: None,
            target: PathBuf::from(constants::DEFAULT_TARGET),
            args: Vec::new(),
            hostname: Some(constants::DEFAULT_HOSTNAME.to_string()),
            namespaces: NamespaceSet::default(),
            mount_point: PathBuf::from(constants::DEFAULT_MOUNT_POINT),
            pseudo_filesystems: PseudoFilesystem::default_set(),
            bind_mounts: Vec::new(),
            share_network_config: false,
            environment: EnvironmentPolicy::default(),
            workdir: PathBuf::from(constants::DEFAULT_WORKDIR),
        }
    }
}

/// Where the image comes from, before it is resolved to a file and offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A squashfs file, possibly at an offset.
    File(ImageLocation),
    /// A section of an ELF executable.
    Embedded {
        /// Executable carrying the section.
        executable: PathBuf,
        /// Section name.
        section: String,
    },
}

impl LauncherConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Config` if the JSON is malformed or has unknown keys.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| LaunchError::Config {
            message: format!("config parse error: {e}"),
        })
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| LaunchError::Config {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json(&text)
    }

    /// Loads the default configuration file if it exists, else built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Config` if the default file exists but is invalid.
    pub fn load_default() -> Result<Self> {
        let path = Path::new(constants::DEFAULT_CONFIG_FILE);
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolves which image source the configuration selects.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::Config` if both a file and a section are set.
    pub fn image_source(&self) -> Result<ImageSource> {
        match (&self.image, &self.embedded_section) {
            (Some(_), Some(_)) => Err(LaunchError::Config {
                message: "`image` and `embedded_section` are mutually exclusive".into(),
            }),
            (Some(path), None) => Ok(ImageSource::File(ImageLocation::at_offset(
                path,
                self.image_offset,
            ))),
            (None, Some(section)) => Ok(ImageSource::Embedded {
                executable: PathBuf::from("/proc/self/exe"),
                section: section.clone(),
            }),
            (None, None) => Ok(ImageSource::File(ImageLocation::at_offset(
                constants::DEFAULT_IMAGE_PATH,
                self.image_offset,
            ))),
        }
    }

    /// Freezes the configuration into a spec for the resolved `image`.
    #[must_use]
    pub fn into_spec(self, image: ImageLocation, forwarded_args: Option<Vec<String>>) -> ContainerSpec {
        let mut bind_mounts = self.bind_mounts;
        if self.share_network_config {
            bind_mounts.extend(
                constants::NETWORK_CONFIG_FILES
                    .iter()
                    .map(BindMount::readonly_same_path),
            );
        }
        ContainerSpec {
            image,
            image_sha256: self.image_sha256,
            target_executable: self.target,
            forwarded_args: forwarded_args.unwrap_or(self.args),
            environment_policy: self.environment,
            namespaces: self.namespaces,
            mount_point: self.mount_point,
            pseudo_filesystems: self.pseudo_filesystems,
            bind_mounts,
            hostname: self.hostname,
            workdir: self.workdir,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::types::EnvAction;

    #[test]
    fn empty_document_yields_defaults() {
        let config = LauncherConfig::from_json("{}").expect("parse");
        assert_eq!(config, LauncherConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(LauncherConfig::from_json(r#"{"imgae": "/x"}"#).is_err());
    }

    #[test]
    fn full_document_parses() {
        let config = LauncherConfig::from_json(
            r#"{
                "image": "/srv/app.squashfs",
                "target": "/usr/bin/app",
                "args": ["--serve"],
                "namespaces": {"network": true},
                "pseudo_filesystems": ["proc", "dev"],
                "bind_mounts": [{"source": "/srv/data", "target": "/data", "readonly": true}],
                "environment": {"clear_unlisted": true, "rules": {"TERM": "pass_through", "LANG": {"override": "C"}}}
            }"#,
        )
        .expect("parse");
        assert_eq!(config.image.as_deref(), Some(Path::new("/srv/app.squashfs")));
        assert!(config.namespaces.network);
        assert!(config.namespaces.uts, "unset namespace fields keep defaults");
        assert_eq!(
            config.pseudo_filesystems,
            vec![PseudoFilesystem::Proc, PseudoFilesystem::Dev]
        );
        assert!(config.environment.clear_unlisted);
        assert_eq!(
            config.environment.action("LANG"),
            Some(&EnvAction::Override("C".into()))
        );
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(br#"{"hostname": "box"}"#).expect("write");
        let config = LauncherConfig::load(file.path()).expect("load");
        assert_eq!(config.hostname.as_deref(), Some("box"));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = LauncherConfig::load(Path::new("/nonexistent/snow.json")).unwrap_err();
        assert!(matches!(err, LaunchError::Config { .. }));
    }

    #[test]
    fn image_and_section_are_exclusive() {
        let config = LauncherConfig {
            image: Some("/a".into()),
            embedded_section: Some(".squashfs".into()),
            ..LauncherConfig::default()
        };
        assert!(config.image_source().is_err());
    }

    #[test]
    fn image_source_defaults_to_packaged_path() {
        let source = LauncherConfig::default().image_source().expect("source");
        assert_eq!(
            source,
            ImageSource::File(ImageLocation::new(constants::DEFAULT_IMAGE_PATH))
        );
    }

    #[test]
    fn into_spec_appends_network_config_binds() {
        let config = LauncherConfig {
            share_network_config: true,
            ..LauncherConfig::default()
        };
        let spec = config.into_spec(ImageLocation::new("/img"), None);
        assert_eq!(spec.bind_mounts.len(), constants::NETWORK_CONFIG_FILES.len());
        assert!(spec.bind_mounts.iter().all(|b| b.readonly));
    }

    #[test]
    fn into_spec_prefers_forwarded_args_over_configured() {
        let config = LauncherConfig {
            args: vec!["-l".into()],
            ..LauncherConfig::default()
        };
        let spec = config
            .clone()
            .into_spec(ImageLocation::new("/img"), Some(vec!["-c".into(), "true".into()]));
        assert_eq!(spec.forwarded_args, vec!["-c", "true"]);
        let spec = config.into_spec(ImageLocation::new("/img"), None);
        assert_eq!(spec.forwarded_args, vec!["-l"]);
    }
}
