//! # CLI Module
//!
//! Command-line entry points for the `brrtgate` binary.
//!
//! ## Commands
//!
//! ### `validate`
//!
//! Load a gateway config, apply environment overrides, validate it and print the effective
//! per-channel settings as JSON:
//!
//! ```bash
//! brrtgate validate --config gateway.yaml
//! ```
//!
//! ### `simulate`
//!
//! Run the configured gateways against an in-process echo backend and print a JSON summary
//! followed by the Prometheus metrics text:
//!
//! ```bash
//! brrtgate simulate --config gateway.yaml --requests 10000 --connections 8 \
//!     --actions SendText,Typing --service-delay-ms 2
//! ```
//!
//! Logs go to stderr and follow the `BRRTG_LOG_*` variables described in
//! [`crate::logging`].

mod commands;
mod simulate;

#[cfg(test)]
mod tests;

pub use commands::{run, run_cli, Cli, Commands};
pub use simulate::{simulate, SimulateOptions, SimulationReport};
