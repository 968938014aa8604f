use crate::app::export::{build_results, output_base_name, read_results, to_csv, to_json};
use crate::config::settings::{OutputFormat, ThresholdSettings};
use crate::core::discovery::DiscoveryEngine;
use crate::core::validator::{BatchOptions, CancellationFlag, EvidenceValidator};
use crate::domain::model::{College, SearchQuery};
use crate::domain::ports::{LlmClient, PageFetcher, Pipeline, Storage};
use crate::utils::error::{Result, ScoutError};
use chrono::Utc;
use std::sync::Mutex;

/// Where the colleges come from.
pub enum Source<L: LlmClient> {
    Discover {
        engine: DiscoveryEngine<L>,
        query: SearchQuery,
    },
    /// A results file exported by an earlier run, validated again.
    ResultsFile(String),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub skip_validation: bool,
    pub workers: usize,
    pub cancel: CancellationFlag,
    pub format: OutputFormat,
    pub thresholds: ThresholdSettings,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            skip_validation: false,
            workers: 1,
            cancel: CancellationFlag::new(),
            format: OutputFormat::Json,
            thresholds: ThresholdSettings::default(),
        }
    }
}

/// Discover (or reload), validate against web evidence, export.
pub struct DiscoveryPipeline<S: Storage, L: LlmClient, F: PageFetcher + Clone + 'static> {
    storage: S,
    source: Source<L>,
    validator: EvidenceValidator<F>,
    options: PipelineOptions,
    query: Mutex<Option<SearchQuery>>,
}

impl<S, L, F> DiscoveryPipeline<S, L, F>
where
    S: Storage,
    L: LlmClient,
    F: PageFetcher + Clone + 'static,
{
    pub fn new(storage: S, source: Source<L>, fetcher: F, options: PipelineOptions) -> Self {
        let query = match &source {
            Source::Discover { query, .. } => Some(query.clone()),
            Source::ResultsFile(_) => None,
        };
        Self {
            storage,
            source,
            validator: EvidenceValidator::new(fetcher),
            options,
            query: Mutex::new(query),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn remember_query(&self, query: SearchQuery) {
        let mut slot = self
            .query
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(query);
    }

    fn current_query(&self) -> Result<SearchQuery> {
        self.query
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| ScoutError::ProcessingError {
                message: "no search query known for this run".to_string(),
            })
    }
}

#[async_trait::async_trait]
impl<S, L, F> Pipeline for DiscoveryPipeline<S, L, F>
where
    S: Storage,
    L: LlmClient,
    F: PageFetcher + Clone + 'static,
{
    async fn extract(&self) -> Result<Vec<College>> {
        match &self.source {
            Source::Discover { engine, query } => Ok(engine.discover(query).await),
            Source::ResultsFile(path) => {
                tracing::info!("📂 Reading previous results from {}", path);
                let data = self.storage.read_file(path).await?;
                let document = read_results(&data)?;
                self.remember_query(document.search_query.clone());
                Ok(document.into_colleges())
            }
        }
    }

    async fn transform(&self, colleges: Vec<College>) -> Result<Vec<College>> {
        if self.options.skip_validation {
            tracing::info!("⏭️ Validation skipped, exporting discovered data as-is");
            return Ok(colleges);
        }
        if colleges.is_empty() {
            return Ok(colleges);
        }

        let total = colleges.len();
        let originals = colleges.clone();
        let batch = BatchOptions {
            workers: self.options.workers,
            cancel: self.options.cancel.clone(),
        };
        let report = self.validator.validate_batch(colleges, &batch).await;

        if report.colleges.len() != total {
            tracing::warn!("🔶 validation encountered issues, proceeding with unvalidated data");
            return Ok(originals);
        }

        tracing::info!(
            "✅ Validation finished: {} validated, {} failed, {} cancelled",
            report.validated,
            report.failed,
            report.cancelled
        );
        Ok(report.colleges)
    }

    async fn load(&self, colleges: Vec<College>) -> Result<String> {
        let query = self.current_query()?;
        let base_name = output_base_name(&query, Utc::now());
        let document = build_results(query, colleges, &self.options.thresholds);

        tracing::info!(
            "📊 {} colleges, {} verified, avg confidence {:.2}",
            document.summary.total_colleges,
            document.summary.verified_colleges,
            document.summary.avg_confidence
        );

        let mut written = Vec::new();
        if self.options.format.writes_json() {
            let path = format!("{}.json", base_name);
            self.storage
                .write_file(&path, to_json(&document)?.as_bytes())
                .await?;
            written.push(path);
        }
        if self.options.format.writes_csv() {
            let path = format!("{}.csv", base_name);
            self.storage.write_file(&path, &to_csv(&document)?).await?;
            written.push(path);
        }

        tracing::debug!("💾 Wrote {} file(s)", written.len());
        Ok(written.join(", "))
    }
}
