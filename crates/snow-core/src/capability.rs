//! Privilege guard.
//!
//! Namespace, mount, and `pivot_root` calls fail deep inside the kernel with
//! a bare `EPERM` when the caller is not privileged. Checking the effective
//! capability set up front turns that into an actionable error before any
//! state has been created.

use snow_common::error::{LaunchError, Result};

use crate::host::Host;

/// Linux capability identifiers relevant to the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `CAP_SYS_ADMIN`: `unshare`, `setns`, `mount`, `pivot_root`, loop setup.
    SysAdmin,
}

impl Capability {
    /// Bit index in the kernel capability mask.
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            Self::SysAdmin => 21,
        }
    }

    /// Kernel name of the capability.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SysAdmin => "CAP_SYS_ADMIN",
        }
    }

    /// Whether the capability is set in `mask`.
    #[must_use]
    pub const fn is_in(self, mask: u64) -> bool {
        mask & (1 << self.bit()) != 0
    }
}

/// Capabilities the launcher cannot work without.
pub const REQUIRED: [Capability; 1] = [Capability::SysAdmin];

/// Extracts the `CapEff` mask from the text of `/proc/<pid>/status`.
#[must_use]
pub fn parse_effective_mask(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("CapEff:"))
        .and_then(|hex| u64::from_str_radix(hex.trim(), 16).ok())
}

/// Reads the effective capability mask of the calling process.
///
/// # Errors
///
/// Returns an error if `/proc/self/status` cannot be read or has no `CapEff` line.
pub fn read_effective_mask() -> std::io::Result<u64> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    parse_effective_mask(&status).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "no CapEff line in /proc/self/status",
        )
    })
}

/// Fails with `InsufficientPrivilege` unless every [`REQUIRED`] capability
/// is effective. Issues no namespace or mount call.
///
/// # Errors
///
/// Returns `LaunchError::InsufficientPrivilege` if a capability is missing or
/// the capability set cannot be determined.
pub fn check_privileges<H: Host + ?Sized>(host: &H) -> Result<()> {
    let mask = host
        .effective_capabilities()
        .map_err(|e| LaunchError::InsufficientPrivilege {
            message: format!("cannot determine effective capabilities: {e}"),
        })?;
    let missing: Vec<&str> = REQUIRED
        .iter()
        .filter(|cap| !cap.is_in(mask))
        .map(|cap| cap.name())
        .collect();
    if !missing.is_empty() {
        return Err(LaunchError::InsufficientPrivilege {
            message: format!(
                "missing {} (effective mask {mask:#018x}); run as root",
                missing.join(", ")
            ),
        });
    }
    tracing::debug!(mask = format_args!("{mask:#x}"), "privilege check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_STATUS: &str = "Name:\tsnow\nCapInh:\t0000000000000000\nCapPrm:\t000001ffffffffff\nCapEff:\t000001ffffffffff\nCapBnd:\t000001ffffffffff\n";
    const USER_STATUS: &str = "Name:\tsnow\nCapEff:\t0000000000000000\n";

    #[test]
    fn parse_effective_mask_reads_cap_eff_line() {
        assert_eq!(parse_effective_mask(ROOT_STATUS), Some(0x01ff_ffff_ffff));
        assert_eq!(parse_effective_mask(USER_STATUS), Some(0));
    }

    #[test]
    fn parse_effective_mask_missing_line_returns_none() {
        assert_eq!(parse_effective_mask("Name:\tsnow\n"), None);
    }

    #[test]
    fn sys_admin_bit_is_21() {
        assert!(Capability::SysAdmin.is_in(1 << 21));
        assert!(!Capability::SysAdmin.is_in(!(1 << 21)));
    }
}
