use anyhow::{Context, Result};
use broker_config::{BrokerConfig, ConfigLoader};
use broker_core::{EvidenceBroker, HttpTransport, MemoryStateStore};
use broker_service::{
	api::{self, AppState},
	cli::{Cli, Command},
	policy::AllowAll,
	telemetry,
};
use broker_types::DebugFields;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

	let log_level = cli
		.log_level
		.clone()
		.unwrap_or_else(|| config.broker.log_level.clone());
	telemetry::init_tracing(&log_level, config.broker.environment)?;

	match cli.command {
		Some(Command::Start) | None => start_service(config).await,
		Some(Command::Validate) => validate_config(config),
	}
}

async fn start_service(config: BrokerConfig) -> Result<()> {
	info!("Starting evidence broker {}", config.broker.name);
	info!("Environment: {}", config.broker.environment);
	info!("HTTP port: {}", config.broker.http_port);

	let transport = HttpTransport::new(&config.transport).context("Failed to build transport")?;
	let broker = EvidenceBroker::new(
		&config,
		Arc::new(transport),
		Arc::new(MemoryStateStore::new()),
	)
	.context("Failed to build broker")?;
	info!("Serving {} evidence codes", broker.registry().len());

	let debug = if config.broker.environment.exposes_debug_details() {
		DebugFields::Include
	} else {
		DebugFields::Omit
	};
	let state = AppState {
		broker: Arc::new(broker),
		policy: Arc::new(AllowAll),
		debug,
		name: config.broker.name.clone(),
	};

	api::start_http_server(state, config.broker.http_port, shutdown_signal()).await?;

	info!("Evidence broker stopped");
	Ok(())
}

fn validate_config(config: BrokerConfig) -> Result<()> {
	let registry =
		broker_core::SourceRegistry::from_config(&config).context("Invalid source registry")?;

	info!("Configuration is valid");
	info!("Broker name: {}", config.broker.name);
	for endpoint in registry.endpoints() {
		info!(
			"  {} -> {} ({})",
			endpoint.evidence_code, endpoint.source_name, endpoint.url
		);
	}

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	info!("Shutdown signal received, draining connections");
}
