//! Agent coordinator CLI
//!
//! Commands:
//! - `agent-coordinator run` - Assign a plan and run the engine until interrupted
//! - `agent-coordinator check-config` - Load and validate configuration
//! - `agent-coordinator show-plan` - Print a plan with its resolved assignees

pub mod config;
pub mod plan;
pub mod run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Coordinates agents over append-only topics and pays them for completed work
#[derive(Parser, Debug)]
#[command(name = "agent-coordinator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(long, global = true, env = "COORD_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assign a plan and run until Ctrl-C / SIGTERM
    Run {
        /// Plan JSON file; the built-in integration plan when omitted
        #[arg(short, long)]
        plan: Option<PathBuf>,
        /// Start scripted local agents for every configured agent
        #[arg(long)]
        simulate: bool,
        /// Publish every simulated result twice
        #[arg(long, requires = "simulate")]
        duplicate_results: bool,
    },

    /// Load and validate configuration, printing every problem
    CheckConfig,

    /// Print a plan's sequences and tasks with their resolved assignees
    ShowPlan {
        /// Plan JSON file; the built-in integration plan when omitted
        #[arg(short, long)]
        plan: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "agent-coordinator",
            "--config-dir",
            "/etc/coord",
            "run",
            "--plan",
            "plan.json",
            "--simulate",
        ]);
        assert_eq!(cli.config_dir, PathBuf::from("/etc/coord"));
        match cli.command {
            Commands::Run {
                plan,
                simulate,
                duplicate_results,
            } => {
                assert_eq!(plan, Some(PathBuf::from("plan.json")));
                assert!(simulate);
                assert!(!duplicate_results);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_results_requires_simulate() {
        assert!(Cli::try_parse_from(["agent-coordinator", "run", "--duplicate-results"]).is_err());
    }
}
