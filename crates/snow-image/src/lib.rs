//! # snow-image
//!
//! Image artifact handling for the snow launcher.
//!
//! - **Artifact**: turns a late, cryptic mount failure into an early,
//!   diagnosable [`InvalidArtifact`](snow_common::error::LaunchError::InvalidArtifact)
//!   by checking the squashfs superblock before any privileged call.
//! - **Hash**: SHA-256 verification of the image region.
//! - **Embedded**: locates an image stored as a section of an ELF executable.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod artifact;
pub mod embedded;
pub mod hash;
