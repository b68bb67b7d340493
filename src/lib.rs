//! Clickstream session reconstruction and multi-touch attribution engine.
//!
//! Consumes a canonical event feed, deduplicates it, rebuilds sessions,
//! attributes purchase revenue to first/last marketing touches, rolls the
//! results up for BI consumers, and monitors drift against a rolling
//! baseline.

pub mod config;
pub mod device;
pub mod feed;
pub mod models;
pub mod payload;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::{run, PipelineOutput};
