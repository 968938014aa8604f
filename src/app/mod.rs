pub mod export;
pub mod pipelines;
