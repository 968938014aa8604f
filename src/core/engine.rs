use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

/// Drives a pipeline through discover, validate and export.
pub struct ScoutEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> ScoutEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting college scout run");
        self.monitor.log_stats("Start");

        // Extract
        tracing::info!("📥 Discovering colleges...");
        let colleges = self.pipeline.extract().await?;
        tracing::info!("📥 Discovered {} colleges", colleges.len());
        self.monitor.log_stats("Discover");

        // Transform
        tracing::info!("🔄 Validating against web evidence...");
        let validated = self.pipeline.transform(colleges).await?;
        let checked = validated.iter().filter(|c| c.is_validated()).count();
        tracing::info!("🔄 Validated {}/{} colleges", checked, validated.len());
        self.monitor.log_stats("Validate");

        // Load
        tracing::info!("💾 Exporting results...");
        let output_path = self.pipeline.load(validated).await?;
        tracing::info!("💾 Output saved to: {}", output_path);
        self.monitor.log_stats("Export");

        self.monitor.log_final_stats();
        Ok(output_path)
    }
}
