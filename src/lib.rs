pub mod config;
pub mod estate;
pub mod http;
pub mod is24;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod redis_sink;
pub mod sink;

pub use config::PipelineConfig;
pub use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
pub use sink::{MemorySink, NodeSink, PublishedNode};
