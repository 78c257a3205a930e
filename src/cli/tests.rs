//! Unit tests for CLI argument parsing

use crate::cli::{Cli, Commands};
use clap::Parser;

#[test]
fn test_validate_command_parses() {
    let cli = Cli::try_parse_from(["brrtgate", "validate", "--config", "gateway.yaml"]).unwrap();
    match cli.command {
        Commands::Validate { config } => assert_eq!(config.to_string_lossy(), "gateway.yaml"),
        _ => panic!("Expected Validate command"),
    }
}

#[test]
fn test_simulate_defaults() {
    let cli = Cli::try_parse_from(["brrtgate", "simulate", "-c", "gateway.yaml"]).unwrap();
    match cli.command {
        Commands::Simulate {
            requests,
            connections,
            actions,
            service_delay_ms,
            drain_ms,
            ..
        } => {
            assert_eq!(requests, 1000);
            assert_eq!(connections, 4);
            assert_eq!(actions, vec!["Echo".to_string()]);
            assert_eq!(service_delay_ms, 0);
            assert_eq!(drain_ms, 5000);
        }
        _ => panic!("Expected Simulate command"),
    }
}

#[test]
fn test_simulate_with_actions_and_global_flags() {
    let cli = Cli::try_parse_from([
        "brrtgate",
        "simulate",
        "--config",
        "gateway.yaml",
        "--requests",
        "50",
        "--actions",
        "SendText,Typing",
        "--log-level",
        "debug",
    ])
    .unwrap();
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    match cli.command {
        Commands::Simulate {
            requests, actions, ..
        } => {
            assert_eq!(requests, 50);
            assert_eq!(actions, vec!["SendText".to_string(), "Typing".to_string()]);
        }
        _ => panic!("Expected Simulate command"),
    }
}

#[test]
fn test_unknown_command_is_rejected() {
    assert!(Cli::try_parse_from(["brrtgate", "frobnicate"]).is_err());
}
