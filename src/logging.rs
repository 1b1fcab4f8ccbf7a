use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` takes precedence over `fallback`. Later calls keep the first subscriber.
pub fn init(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_target(true))
        .try_init();

    match result {
        Ok(()) => tracing::debug!(filter = fallback, "logging initialized"),
        Err(err) => tracing::debug!("logging already initialized: {err}"),
    }
}
