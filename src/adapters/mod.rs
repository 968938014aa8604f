// 外部系統的具體實作
pub mod llm;

pub use llm::ChatCompletionsClient;
