//! Domain primitive types used across the snow workspace.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, Result};

/// Location of a squashfs image: a file plus the byte region the
/// filesystem occupies (a sub-range for images embedded in an executable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLocation {
    /// File holding the image.
    pub path: PathBuf,
    /// Offset of the squashfs superblock inside `path`.
    pub offset: u64,
    /// Length of the image region; `None` runs to the end of the file.
    pub length: Option<u64>,
}

impl ImageLocation {
    /// An image occupying a whole file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            length: None,
        }
    }

    /// An image starting `offset` bytes into `path`.
    #[must_use]
    pub fn at_offset(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            length: None,
        }
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "{}", self.path.display())
        } else {
            write!(f, "{}@{}", self.path.display(), self.offset)
        }
    }
}

/// SHA-256 hash digest used for image verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Hash(String);

impl Sha256Hash {
    /// Creates a hash from a hex-encoded string. Upper-case input is normalised.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid 64-character hex string.
    pub fn from_hex(hex: impl Into<String>) -> Result<Self> {
        let hex = hex.into();
        if hex.len() != crate::constants::SHA256_HEX_LENGTH
            || !hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(LaunchError::Config {
                message: format!("invalid SHA-256 hex string: {hex}"),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Returns the hex-encoded hash string.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Sha256Hash {
    type Error = LaunchError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(value)
    }
}

impl From<Sha256Hash> for String {
    fn from(value: Sha256Hash) -> Self {
        value.0
    }
}

impl fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// A single isolation domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    /// Mount table.
    Mount,
    /// Hostname and domain name.
    Uts,
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Process IDs (applies to children of the target).
    Pid,
    /// Network stack.
    Network,
}

impl NamespaceKind {
    /// Entry name under `/proc/<pid>/ns/`.
    #[must_use]
    pub const fn proc_name(self) -> &'static str {
        match self {
            Self::Mount => "mnt",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Pid => "pid",
            Self::Network => "net",
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mount => "mount",
            Self::Uts => "uts",
            Self::Ipc => "ipc",
            Self::Pid => "pid",
            Self::Network => "network",
        };
        f.write_str(name)
    }
}

/// Which namespaces to create for the container.
///
/// The mount namespace is always created, regardless of `mount`.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NamespaceSet {
    /// Isolate the mount table. Forced on.
    pub mount: bool,
    /// Isolate hostname.
    pub uts: bool,
    /// Isolate IPC objects.
    pub ipc: bool,
    /// Isolate process IDs for the target's children.
    pub pid: bool,
    /// Isolate the network stack (loopback only, nothing configured).
    pub network: bool,
}

impl Default for NamespaceSet {
    fn default() -> Self {
        Self {
            mount: true,
            uts: true,
            ipc: true,
            pid: false,
            network: false,
        }
    }
}

impl NamespaceSet {
    /// Requested kinds in creation order. Mount always comes first.
    #[must_use]
    pub fn kinds(&self) -> Vec<NamespaceKind> {
        let mut kinds = vec![NamespaceKind::Mount];
        for (enabled, kind) in [
            (self.uts, NamespaceKind::Uts),
            (self.ipc, NamespaceKind::Ipc),
            (self.pid, NamespaceKind::Pid),
            (self.network, NamespaceKind::Network),
        ] {
            if enabled {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Whether `kind` will be created.
    #[must_use]
    pub fn contains(&self, kind: NamespaceKind) -> bool {
        self.kinds().contains(&kind)
    }
}

/// Kernel pseudo-filesystems that can be mounted inside the new root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PseudoFilesystem {
    /// `/proc`.
    Proc,
    /// `/sys`, read-only.
    Sys,
    /// `/dev`, recursively bound from the host.
    Dev,
    /// `/dev/pts`, a fresh devpts instance.
    DevPts,
    /// `/dev/shm`, a tmpfs.
    Shm,
    /// `/dev/mqueue`.
    Mqueue,
}

impl PseudoFilesystem {
    /// Filesystems mounted when the configuration does not list any.
    #[must_use]
    pub fn default_set() -> Vec<Self> {
        vec![Self::Proc, Self::Sys, Self::Dev, Self::Shm]
    }

    /// Absolute path inside the container.
    #[must_use]
    pub const fn container_path(self) -> &'static str {
        match self {
            Self::Proc => "/proc",
            Self::Sys => "/sys",
            Self::Dev => "/dev",
            Self::DevPts => "/dev/pts",
            Self::Shm => "/dev/shm",
            Self::Mqueue => "/dev/mqueue",
        }
    }
}

impl fmt::Display for PseudoFilesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Proc => "proc",
            Self::Sys => "sys",
            Self::Dev => "dev",
            Self::DevPts => "devpts",
            Self::Shm => "shm",
            Self::Mqueue => "mqueue",
        };
        f.write_str(name)
    }
}

impl FromStr for PseudoFilesystem {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "proc" => Ok(Self::Proc),
            "sys" | "sysfs" => Ok(Self::Sys),
            "dev" => Ok(Self::Dev),
            "devpts" => Ok(Self::DevPts),
            "shm" => Ok(Self::Shm),
            "mqueue" => Ok(Self::Mqueue),
            other => Err(LaunchError::Config {
                message: format!("unknown pseudo-filesystem: {other}"),
            }),
        }
    }
}

/// A host path made visible inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindMount {
    /// Host path.
    pub source: PathBuf,
    /// Absolute path inside the container.
    pub target: PathBuf,
    /// Remount read-only after binding.
    #[serde(default)]
    pub readonly: bool,
}

impl BindMount {
    /// Read-only bind of a host path onto the same path in the container.
    #[must_use]
    pub fn readonly_same_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            source: path.clone(),
            target: path,
            readonly: true,
        }
    }
}

impl FromStr for BindMount {
    type Err = LaunchError;

    /// Parses `SRC[:DST][:ro|:rw]`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts: Vec<&str> = s.split(':').collect();
        let readonly = match parts.last() {
            Some(&"ro") if parts.len() > 1 => {
                let _ = parts.pop();
                true
            }
            Some(&"rw") if parts.len() > 1 => {
                let _ = parts.pop();
                false
            }
            _ => false,
        };
        let (source, target) = match parts.as_slice() {
            [src] if !src.is_empty() => (*src, *src),
            [src, dst] if !src.is_empty() && !dst.is_empty() => (*src, *dst),
            _ => {
                return Err(LaunchError::Config {
                    message: format!("invalid bind mount `{s}`, expected SRC[:DST][:ro]"),
                });
            }
        };
        if !Path::new(target).is_absolute() {
            return Err(LaunchError::Config {
                message: format!("bind mount target must be absolute: {target}"),
            });
        }
        Ok(Self {
            source: PathBuf::from(source),
            target: PathBuf::from(target),
            readonly,
        })
    }
}

/// What to do with one environment variable when launching the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvAction {
    /// Copy the inherited value verbatim.
    PassThrough,
    /// Replace (or add) the variable with this value.
    Override(String),
    /// Remove the variable.
    Drop,
}

/// Rules turning the launcher's environment into the target's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvironmentPolicy {
    /// Drop every inherited variable that has no rule.
    pub clear_unlisted: bool,
    /// Per-variable rules, keyed by name.
    pub rules: BTreeMap<String, EnvAction>,
}

impl EnvironmentPolicy {
    /// Adds or replaces the rule for `name`.
    pub fn set(&mut self, name: impl Into<String>, action: EnvAction) -> &mut Self {
        let _ = self.rules.insert(name.into(), action);
        self
    }

    /// Rule for `name`, if any.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<&EnvAction> {
        self.rules.get(name)
    }
}

/// Everything the launcher needs for one invocation.
///
/// Built once from CLI input and configuration, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// The squashfs image to use as root.
    pub image: ImageLocation,
    /// Expected digest of the image region, if verification is requested.
    pub image_sha256: Option<Sha256Hash>,
    /// Executable path inside the image.
    pub target_executable: PathBuf,
    /// Arguments appended after `target_executable` in argv.
    pub forwarded_args: Vec<String>,
    /// Environment filtering rules.
    pub environment_policy: EnvironmentPolicy,
    /// Namespaces to create.
    pub namespaces: NamespaceSet,
    /// Host directory the image is mounted on before the root switch.
    pub mount_point: PathBuf,
    /// Pseudo-filesystems to mount inside the root, in order.
    pub pseudo_filesystems: Vec<PseudoFilesystem>,
    /// Extra bind mounts, applied after the pseudo-filesystems.
    pub bind_mounts: Vec<BindMount>,
    /// Hostname set inside a fresh UTS namespace.
    pub hostname: Option<String>,
    /// Working directory inside the new root.
    pub workdir: PathBuf,
}

impl ContainerSpec {
    /// Spec with default isolation for `image` and `target_executable`.
    #[must_use]
    pub fn new(image: ImageLocation, target_executable: impl Into<PathBuf>) -> Self {
        Self {
            image,
            image_sha256: None,
            target_executable: target_executable.into(),
            forwarded_args: Vec::new(),
            environment_policy: EnvironmentPolicy::default(),
            namespaces: NamespaceSet::default(),
            mount_point: PathBuf::from(crate::constants::DEFAULT_MOUNT_POINT),
            pseudo_filesystems: PseudoFilesystem::default_set(),
            bind_mounts: Vec::new(),
            hostname: Some(crate::constants::DEFAULT_HOSTNAME.to_string()),
            workdir: PathBuf::from(crate::constants::DEFAULT_WORKDIR),
        }
    }
}
