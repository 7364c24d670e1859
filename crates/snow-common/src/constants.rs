//! System-wide constants, default paths, and exit codes.

/// Application name used in CLI output and log prefixes.
pub const APP_NAME: &str = "snow";

/// Environment variable that selects the log verbosity.
pub const LOG_ENV_VAR: &str = "SNOW_LOG";

/// Log filter used when [`LOG_ENV_VAR`] is unset.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Configuration file consulted when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/snow/config.json";

/// Image artifact used when neither a path nor an embedded section is configured.
pub const DEFAULT_IMAGE_PATH: &str = "/usr/share/snow/rootfs.squashfs";

/// ELF section name searched for an embedded image.
pub const DEFAULT_EMBEDDED_SECTION: &str = ".squashfs";

/// Executable started inside the container by default.
pub const DEFAULT_TARGET: &str = "/bin/sh";

/// Hostname applied inside a fresh UTS namespace.
pub const DEFAULT_HOSTNAME: &str = "snow";

/// Directory the image is mounted on before the root switch.
///
/// The per-process `fd` directory always exists, belongs to the launcher
/// alone, and needs no host-side cleanup. Mounting over it is only visible
/// inside the launcher's private mount namespace.
pub const DEFAULT_MOUNT_POINT: &str = "/proc/self/fd";

/// Working directory inside the new root after the switch.
pub const DEFAULT_WORKDIR: &str = "/";

/// Host files shared read-only by `--share-network-config`.
pub const NETWORK_CONFIG_FILES: [&str; 3] = ["/etc/resolv.conf", "/etc/hosts", "/etc/hostname"];

/// Squashfs superblock magic (`hsqs` on disk, little-endian).
pub const SQUASHFS_MAGIC: u32 = 0x7371_7368;

/// Size of the squashfs superblock in bytes.
pub const SQUASHFS_SUPERBLOCK_LEN: u64 = 96;

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Exit code for invalid configuration or flag combinations.
pub const EXIT_CONFIG: u8 = 70;
/// Exit code when the image artifact fails validation.
pub const EXIT_INVALID_ARTIFACT: u8 = 71;
/// Exit code when the launcher lacks the required capabilities.
pub const EXIT_INSUFFICIENT_PRIVILEGE: u8 = 72;
/// Exit code when a mount plan escapes its root.
pub const EXIT_MALFORMED_MOUNT_PLAN: u8 = 73;
/// Exit code when a namespace could not be created.
pub const EXIT_NAMESPACE_FAILED: u8 = 74;
/// Exit code when a mount operation failed.
pub const EXIT_MOUNT_FAILED: u8 = 75;
/// Exit code when the root switch failed.
pub const EXIT_ROOT_SWITCH_FAILED: u8 = 76;
/// Exit code when the target could not be executed.
pub const EXIT_EXEC_FAILED: u8 = 77;
/// Base added to the signal number when setup is interrupted.
pub const EXIT_SIGNAL_BASE: u8 = 128;
