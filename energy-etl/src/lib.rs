pub mod config;
pub mod metrics_export;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;
pub mod verify;

#[cfg(test)]
mod test_support;

pub use pipeline::{Pipeline, PipelineError};
