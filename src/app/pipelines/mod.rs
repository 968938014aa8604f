pub mod discovery_pipeline;

pub use discovery_pipeline::{DiscoveryPipeline, PipelineOptions, Source};
