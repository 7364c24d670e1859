//! Unified error types for the snow workspace.
//!
//! [`LaunchError`] is the primary failure taxonomy: every variant aborts the
//! launch sequence and maps to its own exit code. [`TeardownWarning`] is the
//! secondary, non-fatal class collected while releasing resources.

use std::path::PathBuf;

use thiserror::Error;

use crate::constants;
use crate::types::NamespaceKind;

/// Failure before the target executable took over the process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The image artifact is missing, unreadable, empty, or not squashfs.
    #[error("invalid image artifact {path}: {reason}")]
    InvalidArtifact {
        /// Path of the rejected artifact.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// The process lacks the capabilities needed for namespaces and mounts.
    #[error("insufficient privilege: {message}")]
    InsufficientPrivilege {
        /// What is missing.
        message: String,
    },

    /// A mount operation targets a path outside the root mount point.
    #[error("malformed mount plan: {target} is outside of {root}")]
    MalformedMountPlan {
        /// Offending mount target.
        target: PathBuf,
        /// Root mount point the target should live under.
        root: PathBuf,
    },

    /// `unshare(2)` or namespace preparation failed.
    #[error("failed to create {kind} namespace: {source}")]
    NamespaceCreationFailed {
        /// Namespace being created.
        kind: NamespaceKind,
        /// Underlying system error.
        source: std::io::Error,
    },

    /// A mount operation of the plan failed.
    #[error("mount failed ({operation}): {source}")]
    MountFailed {
        /// Human-readable description of the operation.
        operation: String,
        /// Underlying system error.
        source: std::io::Error,
    },

    /// Switching to the new root failed.
    #[error("root switch failed during {stage}: {source}")]
    RootSwitchFailed {
        /// Step of the root switch that failed.
        stage: &'static str,
        /// Underlying system error.
        source: std::io::Error,
    },

    /// The target could not be executed.
    #[error("failed to execute {target}: {source}")]
    ExecFailed {
        /// Target executable path.
        target: PathBuf,
        /// Underlying system error.
        source: std::io::Error,
    },

    /// A termination signal arrived before hand-off.
    #[error("interrupted by signal {signal} before hand-off")]
    Interrupted {
        /// Signal number.
        signal: i32,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },
}

impl LaunchError {
    /// Process exit code reported for this failure.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArtifact { .. } => constants::EXIT_INVALID_ARTIFACT,
            Self::InsufficientPrivilege { .. } => constants::EXIT_INSUFFICIENT_PRIVILEGE,
            Self::MalformedMountPlan { .. } => constants::EXIT_MALFORMED_MOUNT_PLAN,
            Self::NamespaceCreationFailed { .. } => constants::EXIT_NAMESPACE_FAILED,
            Self::MountFailed { .. } => constants::EXIT_MOUNT_FAILED,
            Self::RootSwitchFailed { .. } => constants::EXIT_ROOT_SWITCH_FAILED,
            Self::ExecFailed { .. } => constants::EXIT_EXEC_FAILED,
            Self::Interrupted { signal } => u8::try_from(*signal)
                .ok()
                .and_then(|s| constants::EXIT_SIGNAL_BASE.checked_add(s))
                .unwrap_or(constants::EXIT_SIGNAL_BASE),
            Self::Config { .. } => constants::EXIT_CONFIG,
        }
    }
}

/// A resource that could not be released during teardown.
#[derive(Debug, Error)]
#[error("failed to release {resource}: {source}")]
pub struct TeardownWarning {
    /// Description of the resource.
    pub resource: String,
    /// Underlying system error.
    pub source: std::io::Error,
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, LaunchError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> std::io::Error {
        std::io::Error::from(std::io::ErrorKind::PermissionDenied)
    }

    #[test]
    fn exit_codes_are_distinct_per_category() {
        let errors = [
            LaunchError::InvalidArtifact {
                path: "/x".into(),
                reason: "empty".into(),
            },
            LaunchError::InsufficientPrivilege {
                message: "no CAP_SYS_ADMIN".into(),
            },
            LaunchError::MalformedMountPlan {
                target: "/etc".into(),
                root: "/r".into(),
            },
            LaunchError::NamespaceCreationFailed {
                kind: NamespaceKind::Mount,
                source: io_err(),
            },
            LaunchError::MountFailed {
                operation: "proc".into(),
                source: io_err(),
            },
            LaunchError::RootSwitchFailed {
                stage: "pivot_root",
                source: io_err(),
            },
            LaunchError::ExecFailed {
                target: "/bin/sh".into(),
                source: io_err(),
            },
            LaunchError::Config {
                message: "bad".into(),
            },
        ];
        let mut codes: Vec<u8> = errors.iter().map(LaunchError::exit_code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
        assert!(codes.iter().all(|&c| c != 0 && c < constants::EXIT_SIGNAL_BASE));
    }

    #[test]
    fn interrupted_exit_code_adds_signal_number() {
        assert_eq!(LaunchError::Interrupted { signal: 15 }.exit_code(), 143);
    }

    #[test]
    fn namespace_error_names_the_kind() {
        let err = LaunchError::NamespaceCreationFailed {
            kind: NamespaceKind::Ipc,
            source: io_err(),
        };
        assert!(err.to_string().starts_with("failed to create ipc namespace"));
    }
}
