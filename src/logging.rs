//! Tracing setup shared by both binaries

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used by `drona-api` when `RUST_LOG` is unset
pub const SERVER_FILTER: &str = "drona=info,tower_http=info";

/// Filter used by the terminal client; it keeps the transcript clean
pub const CLIENT_FILTER: &str = "drona=warn";

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins over `default_filter`. Calling twice is harmless.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
