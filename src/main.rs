use anyhow::Context;
use clap::Parser;
use college_scout::config::settings::Settings;
use college_scout::domain::model::SearchQuery;
use college_scout::utils::error::{ErrorSeverity, ScoutError};
use college_scout::utils::{logger, validation::Validate};
use college_scout::{
    CancellationFlag, ChatCompletionsClient, CliConfig, DiscoveryConfig, DiscoveryEngine,
    DiscoveryPipeline, FetchConfig, LocalStorage, PipelineOptions, ScoutEngine, Source,
    WebFetcher,
};
use std::path::PathBuf;

fn exit_code(e: &ScoutError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 資料或設定錯誤
        ErrorSeverity::Critical => 3, // 系統錯誤
    }
}

fn report_failure(stage: &str, e: &ScoutError) -> i32 {
    tracing::error!(
        "❌ {} failed: {} (Category: {:?}, Severity: {:?})",
        stage,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
    exit_code(e)
}

async fn cancel_on_ctrl_c(cancel: CancellationFlag) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::warn!("🛑 Ctrl-C received, finishing colleges already in progress");
    cancel.cancel();
    Ok(())
}

fn load_settings(cli: &CliConfig) -> college_scout::Result<Settings> {
    let settings = cli.load_settings()?;
    settings.validate()?;
    Ok(settings)
}

async fn run(
    cli: &CliConfig,
    settings: Settings,
    input: Option<PathBuf>,
) -> college_scout::Result<String> {
    let cancel = CancellationFlag::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = cancel_on_ctrl_c(watcher).await {
            tracing::warn!("🔶 {:#}", e);
        }
    });

    let fetcher = WebFetcher::new(FetchConfig {
        timeout: settings.fetch.timeout(),
        delay: settings.fetch.delay(),
        user_agent: settings.fetch.user_agent.clone(),
    })?;

    let source = match input {
        Some(path) => Source::ResultsFile(path.to_string_lossy().into_owned()),
        None => {
            let client = ChatCompletionsClient::new(&settings.llm)?;
            let engine = DiscoveryEngine::new(
                client,
                DiscoveryConfig {
                    max_colleges: settings.discovery.max_colleges,
                    fetch_courses: settings.discovery.fetch_courses,
                    delay: settings.fetch.delay(),
                },
            );
            let query = SearchQuery::new(
                cli.location.clone().unwrap_or_default(),
                cli.career_path.clone().unwrap_or_default(),
            );
            Source::Discover { engine, query }
        }
    };

    let options = PipelineOptions {
        skip_validation: cli.skip_validation,
        workers: settings.fetch.workers,
        cancel,
        format: settings.output.format,
        thresholds: settings.thresholds.clone(),
    };

    let storage = LocalStorage::new(settings.output.output_dir.clone());
    let pipeline = DiscoveryPipeline::new(storage, source, fetcher, options);

    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }
    let engine = ScoutEngine::new_with_monitoring(pipeline, cli.monitor);
    engine.run().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting college-scout");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 以目前目錄解析，不受輸出目錄影響
    let input = cli
        .input
        .as_deref()
        .map(std::path::absolute)
        .transpose()
        .context("could not resolve --input path")?;

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => std::process::exit(report_failure("Configuration", &e)),
    };
    let output_dir = settings.output.output_dir.clone();

    match run(&cli, settings, input).await {
        Ok(files) => {
            tracing::info!("✅ Run completed successfully!");
            println!("✅ Run completed successfully!");
            println!("📁 Output saved to {}: {}", output_dir, files);
        }
        Err(e) => {
            let code = report_failure("Run", &e);
            if code > 0 {
                std::process::exit(code);
            }
        }
    }

    Ok(())
}
