pub mod confidence;
pub mod discovery;
pub mod engine;
pub mod fetcher;
pub mod signals;
pub mod validator;

pub use crate::domain::model::{College, Course, SearchQuery};
pub use crate::domain::ports::{LlmClient, PageFetcher, Pipeline, Storage};
pub use crate::utils::error::Result;
