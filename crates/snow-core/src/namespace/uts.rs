//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

/// Sets the hostname inside the UTS namespace.
///
/// # Errors
///
/// Returns the errno of the failed `sethostname(2)`.
pub fn set_hostname(hostname: &str) -> nix::Result<()> {
    nix::unistd::sethostname(hostname)?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}
