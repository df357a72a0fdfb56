//! Tracing setup.

use broker_config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `log_level`.
/// Production deployments log JSON lines.
pub fn init_tracing(log_level: &str, environment: Environment) -> anyhow::Result<()> {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
	let registry = tracing_subscriber::registry().with(env_filter);

	if environment.is_production() {
		registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_current_span(true)
					.with_target(false),
			)
			.try_init()?;
	} else {
		registry.with(tracing_subscriber::fmt::layer()).try_init()?;
	}

	Ok(())
}
