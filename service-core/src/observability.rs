//! Tracing initialization shared by the service binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with an env-filter and fmt layer.
///
/// `RUST_LOG` overrides `default_directives` when set.
pub fn init_tracing(default_directives: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_directives.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
