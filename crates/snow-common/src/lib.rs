//! # snow-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the snow workspace.
//!
//! This crate is the leaf of the dependency graph. It performs no system
//! calls and knows nothing about namespaces or mounts beyond naming them.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
