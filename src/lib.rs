//! github-exporter crate
//!
//! Harvests repository, organisation and rate-limit data from a GitHub-shaped REST API and
//! turns it into point-in-time snapshots that can be rendered as a Prometheus text exposition.
//!
//! # Module Organization
//!
//! - [`config`]: Exporter configuration and its sources
//! - [`auth`]: Credentials and GitHub App installation tokens
//! - [`harvest`]: The pagination-aware, rate-limit-aware harvesting pipeline
//! - [`metrics`]: Rendering of snapshots into metric families

/// Result type alias using `ohno::AppError` as the default error type.
pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod auth;
pub mod config;
pub mod harvest;
pub mod metrics;
