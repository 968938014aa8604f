use crate::domain::model::College;
use crate::utils::error::{FetchError, Result};
use async_trait::async_trait;

/// 一次成功抓取的頁面
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status_code: u16,
    pub body_text: String,
    pub final_url: String,
}

/// Source of web evidence. Implementations own their own request pacing.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError>;
}

/// Text in, JSON-shaped text out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Vec<College>>;
    async fn transform(&self, colleges: Vec<College>) -> Result<Vec<College>>;
    async fn load(&self, colleges: Vec<College>) -> Result<String>;
}
