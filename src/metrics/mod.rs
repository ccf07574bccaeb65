//! Rendering of snapshots into the Prometheus text exposition format.

mod exposition;

pub use exposition::{generate, generate_failure};
