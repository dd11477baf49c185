use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use agent_coordinator::cli::run::{run, RunOptions};
use agent_coordinator::cli::{self, Cli, Commands};
use agent_coordinator::config::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::CheckConfig => {
            init_logging_simple();
            cli::config::check_config(&cli.config_dir)?;
        }
        Commands::ShowPlan { plan } => {
            init_logging_simple();
            let config = load_config(&cli)?;
            cli::plan::show_plan(plan.as_deref(), &config)?;
        }
        Commands::Run {
            plan,
            simulate,
            duplicate_results,
        } => {
            let config = load_config(&cli)?;
            if let Err(errors) = config.validate() {
                for e in &errors {
                    eprintln!("config error: {e}");
                }
                anyhow::bail!("invalid configuration ({} problem(s))", errors.len());
            }
            let _guard = init_logging(&config.logging);
            run(
                config,
                RunOptions {
                    plan: plan.as_deref(),
                    simulate: *simulate,
                    duplicate_results: *duplicate_results,
                },
            )
            .await?;
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    AppConfig::load_from(&cli.config_dir).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            cli.config_dir.display()
        )
    })
}

/// Console (text or JSON) plus an optional daily-rolling file. Keep the
/// returned guard alive for the life of the process or file output is lost.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},agent_coordinator=debug", config.level))
    });

    // `rolling::daily` panics if it cannot create the first file, so check
    // writability up front.
    let (file_layer, guard) = match config.dir.as_deref() {
        Some(dir) => match std::fs::create_dir_all(dir).and_then(|_| {
            let probe = dir.join(".agent_coordinator_write_test");
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&probe)?;
            std::fs::remove_file(&probe)
        }) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(dir, "agent-coordinator.log");
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true);
                eprintln!("Logging to: {}/agent-coordinator.log", dir.display());
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir.display(),
                    e
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let (console_layer, json_layer) = if config.json {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            ),
        )
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}
