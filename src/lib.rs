pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::ChatCompletionsClient;
pub use app::pipelines::{DiscoveryPipeline, PipelineOptions, Source};
pub use config::{cli::LocalStorage, settings::Settings};
pub use core::{
    discovery::{DiscoveryConfig, DiscoveryEngine},
    engine::ScoutEngine,
    fetcher::{FetchConfig, WebFetcher},
    validator::{BatchOptions, BatchReport, CancellationFlag, EvidenceValidator},
};
pub use utils::error::{Result, ScoutError};
