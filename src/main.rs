use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use feedtally_config::RuntimeConfig;
use feedtally_core::parse_day;
use feedtally_flush::FlushOutcome;
use std::path::PathBuf;

/// Engagement ingest server with a once-per-day durable flush
#[derive(Parser)]
#[command(name = "feedtally")]
#[command(version)]
#[command(about = "Engagement ingest server with a once-per-day durable flush", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT", global = true)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and the configured flush trigger (default)
    Serve,
    /// Run one flush attempt and print its report as JSON
    Flush {
        /// Day to flush, YYYY-MM-DD (defaults to yesterday)
        #[arg(long, value_name = "DAY", value_parser = parse_day)]
        day: Option<NaiveDate>,

        /// Re-run the day even if an earlier attempt holds its lock.
        /// Every staged user is written again, including rows already stored.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build tokio runtime and run async entry point
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration (file or defaults, then env)
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        RuntimeConfig::load().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli);
    config.validate()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            print_startup_info(&config);
            feedtally_server::run_with_config(config).await
        }
        Commands::Flush { day, force } => {
            let report = feedtally_server::flush_once(config, day, force).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if let FlushOutcome::Aborted { reason } = &report.outcome {
                anyhow::bail!("flush for {} aborted: {}", report.day, reason);
            }
            Ok(())
        }
    }
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }
}

fn print_startup_info(config: &RuntimeConfig) {
    println!("╭─────────────────────────────────────────────╮");
    println!("│ feedtally {:<33} │", env!("CARGO_PKG_VERSION"));
    println!("├─────────────────────────────────────────────┤");
    println!("│ listen   {:<34} │", config.server.listen_addr);
    println!("│ cache    {:<34} │", config.cache.backend.to_string());
    println!("│ sink     {:<34} │", config.sink.backend.to_string());
    println!("│ trigger  {:<34} │", config.flush.trigger.to_string());
    println!("╰─────────────────────────────────────────────╯");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["feedtally", "--port", "9090", "-v", "debug"]);
        let mut config = RuntimeConfig::default();
        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.server.listen_addr, "0.0.0.0:9090");
        assert_eq!(config.server.log_level, "debug");
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_flush_day_argument() {
        let cli = Cli::parse_from(["feedtally", "flush", "--day", "2024-03-01"]);
        match cli.command {
            Some(Commands::Flush { day, force }) => {
                assert_eq!(day, NaiveDate::from_ymd_opt(2024, 3, 1));
                assert!(!force);
            }
            _ => panic!("expected flush subcommand"),
        }

        assert!(Cli::try_parse_from(["feedtally", "flush", "--day", "March 1"]).is_err());
    }

    #[test]
    fn test_flush_force_flag() {
        let cli = Cli::parse_from(["feedtally", "flush", "--day", "2024-03-01", "--force"]);
        assert!(matches!(cli.command, Some(Commands::Flush { force: true, .. })));
    }
}
