pub mod cli;
pub mod settings;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use settings::Settings;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "college-scout")]
#[command(about = "Discover colleges for a career path and check them against web evidence")]
pub struct CliConfig {
    /// City and/or state to search, e.g. "Bangalore, Karnataka"
    #[arg(long, required_unless_present = "input")]
    pub location: Option<String>,

    /// Career path or field of study, e.g. "Computer Science Engineering"
    #[arg(long, required_unless_present = "input")]
    pub career_path: Option<String>,

    /// TOML settings file
    #[arg(long, env = "COLLEGE_SCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Output directory (overrides OUTPUT_DIR)")]
    pub output_path: Option<String>,

    #[arg(long, value_parser = ["json", "csv", "both"])]
    pub format: Option<String>,

    #[arg(long, help = "Export discovered colleges without web validation")]
    pub skip_validation: bool,

    #[arg(long, help = "Number of validation workers, each with its own request pacing")]
    pub workers: Option<usize>,

    #[arg(long, help = "Seconds between requests (overrides REQUEST_DELAY)")]
    pub delay: Option<f64>,

    #[arg(long, help = "Per-request timeout in seconds (overrides REQUEST_TIMEOUT)")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Re-validate a previously exported results file instead of discovering")]
    pub input: Option<String>,

    #[arg(long, help = "Enable system monitoring")]
    pub monitor: bool,

    #[arg(long, short, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Applies the flags given on the command line on top of `settings`.
    pub fn apply_to(&self, settings: &mut Settings) -> Result<()> {
        if let Some(output_path) = &self.output_path {
            settings.output.output_dir = output_path.clone();
        }
        if let Some(format) = &self.format {
            settings.output.format = format.parse()?;
        }
        if let Some(workers) = self.workers {
            settings.fetch.workers = workers;
        }
        if let Some(delay) = self.delay {
            settings.fetch.request_delay_secs = delay;
        }
        if let Some(timeout) = self.timeout {
            settings.fetch.request_timeout_secs = timeout;
        }
        Ok(())
    }

    /// Environment, then the optional TOML file, then these flags.
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = Settings::from_env()?;
        if let Some(path) = &self.config {
            tracing::debug!("📄 Loading settings from {}", path.display());
            settings = settings.merge_toml_file(path)?;
        }
        self.apply_to(&mut settings)?;
        Ok(settings)
    }
}
