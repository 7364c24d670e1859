//! Launch sequencing for the snow launcher.
//!
//! [`launcher::launch`] drives a [`Host`](snow_core::host::Host) through
//! validation, the privilege check, namespace and mount setup, and the
//! final `execve(2)`. Anything acquired before a failure is released by the
//! [`teardown`] guard.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod exec;
pub mod launcher;
pub mod setup;
pub mod teardown;
