//! Exporter configuration.
//!
//! Configuration comes from an optional file (TOML, YAML or JSON) overlaid with values supplied on the
//! command line or through the environment.

#[expect(clippy::module_inception, reason = "mirrors the layout of the other modules")]
mod config;
mod optional_metric;

pub use config::{AppAuthConfig, Config, ConfigOverrides};
pub use optional_metric::OptionalMetric;
