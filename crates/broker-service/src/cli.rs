//! Command-line interface definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "evidence-broker")]
#[command(about = "Evidence broker service", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
	#[command(subcommand)]
	pub command: Option<Command>,

	/// Path to configuration file
	#[arg(short, long, value_name = "FILE", default_value = "config/broker.toml", global = true)]
	pub config: PathBuf,

	/// Log level override (trace, debug, info, warn, error)
	#[arg(long, env = "BROKER_LOG_LEVEL", global = true)]
	pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	/// Start the broker service
	Start,
	/// Validate the configuration file
	Validate,
}
