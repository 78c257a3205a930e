use super::simulate::{simulate, SimulateOptions};
use crate::config::GatewayConfig;
use crate::logging::{init_logging, LogConfig, LogFormat};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

/// Command-line interface for the protocol gateway
#[derive(Parser, Debug)]
#[command(name = "brrtgate")]
#[command(about = "Protocol gateway dispatcher", long_about = None)]
pub struct Cli {
    /// Log level (overrides BRRTG_LOG_LEVEL)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format: json or pretty (overrides BRRTG_LOG_FORMAT)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a gateway config and print the effective channel settings
    Validate {
        /// Path to the gateway config (YAML, or JSON by extension)
        #[arg(short, long, env = "BRRTG_CONFIG")]
        config: PathBuf,
    },
    /// Drive the configured gateways with an in-process echo backend
    Simulate {
        /// Path to the gateway config (YAML, or JSON by extension)
        #[arg(short, long, env = "BRRTG_CONFIG")]
        config: PathBuf,

        /// Total requests to send
        #[arg(short, long, default_value_t = 1000)]
        requests: usize,

        /// Concurrent client connections
        #[arg(long, default_value_t = 4)]
        connections: usize,

        /// Action names to cycle through (comma-separated or repeated)
        #[arg(long, num_args = 1.., value_delimiter = ',', default_value = "Echo")]
        actions: Vec<String>,

        /// Time the echo service spends on each request
        #[arg(long, default_value_t = 0)]
        service_delay_ms: u64,

        /// How long shutdown waits for in-flight requests
        #[arg(long, default_value_t = 5000)]
        drain_ms: u64,
    },
}

#[derive(Serialize)]
struct ChannelSummary {
    name: String,
    fire_and_forget: Vec<String>,
    call_deadline_ms: u64,
    num_workers: usize,
    queue_bound: usize,
    stack_size: usize,
    max_idle_tasks: usize,
}

/// Parse the process arguments and run the selected command
pub fn run_cli() -> Result<()> {
    run(Cli::parse())
}

/// Run an already parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let mut log_config = LogConfig::from_env();
    if let Some(level) = &cli.log_level {
        log_config.log_level.clone_from(level);
    }
    if let Some(format) = &cli.log_format {
        log_config.format = LogFormat::parse(format);
    }
    init_logging(&log_config)?;

    match cli.command {
        Commands::Validate { config } => {
            let config = GatewayConfig::load(&config)?;
            let summary: Vec<ChannelSummary> = config
                .channel_configs()
                .into_iter()
                .map(|c| ChannelSummary {
                    fire_and_forget: c.fire_and_forget,
                    call_deadline_ms: u64::try_from(c.call_deadline.as_millis())
                        .unwrap_or(u64::MAX),
                    num_workers: c.workers.num_workers,
                    queue_bound: c.workers.queue_bound,
                    stack_size: c.workers.stack_size,
                    max_idle_tasks: c.max_idle_tasks,
                    name: c.name,
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to render summary")?
            );
            Ok(())
        }
        Commands::Simulate {
            config,
            requests,
            connections,
            actions,
            service_delay_ms,
            drain_ms,
        } => {
            let config = GatewayConfig::load(&config)?;
            config.apply_runtime();
            let options = SimulateOptions {
                requests,
                connections,
                actions,
                service_delay: std::time::Duration::from_millis(service_delay_ms),
                drain: std::time::Duration::from_millis(drain_ms),
            };
            let (report, metrics) = simulate(&config, &options)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to render report")?
            );
            print!("{metrics}");
            Ok(())
        }
    }
}
