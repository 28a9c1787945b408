//! `seqrelay` -- CLI binary for the seqrelay ordered relay.
//!
//! Provides the following subcommands:
//!
//! - `seqrelay run` -- Run the speech relay demo until N events are played.
//! - `seqrelay config show` -- Print the resolved configuration.
//! - `seqrelay config validate` -- Check the resolved configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod logging;

/// seqrelay ordered relay CLI.
#[derive(Parser)]
#[command(name = "seqrelay", about = "Ordered relay over variable-latency stages", version)]
struct Cli {
    /// Enable verbose (debug-level) console logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the speech relay demo.
    Run(commands::run::RunArgs),

    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

/// Subcommands for `seqrelay config`.
#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the full resolved configuration.
    Show,

    /// Validate the resolved configuration.
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref()).await;

    match cli.command {
        Commands::Run(args) => {
            let config = config?;
            if let Some(path) = logging::init(cli.verbose, &config.logging)? {
                tracing::info!(path = %path.display(), "debug log file enabled");
            }
            commands::run::run(args, config).await?;
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => commands::config_cmd::config_show(&config?)?,
            ConfigCmd::Validate => commands::config_cmd::config_validate(config)?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_events() {
        let cli = Cli::try_parse_from(["seqrelay", "run", "--events", "5", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run(args) => assert_eq!(args.events, Some(5)),
            Commands::Config { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn parses_config_validate_with_path() {
        let cli =
            Cli::try_parse_from(["seqrelay", "config", "validate", "--config", "relay.json"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("relay.json")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigCmd::Validate
            }
        ));
    }
}
