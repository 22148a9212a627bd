//! # crag-telemetry
//!
//! Shared `tracing` setup for the crag binaries and tests.
//!
//! - [`init_telemetry`] installs a human-readable fmt subscriber
//! - [`init_json`] installs the JSON formatter for log shipping
//! - [`SpanCapture`] records spans and events in memory for assertions
//!
//! Filtering follows `CRAG_LOG`, then `RUST_LOG`, defaulting to `info`.
//! Initialisation is idempotent: only the first call in a process installs
//! a subscriber.

mod memory;

pub use memory::{CaptureLayer, CapturedEvent, CapturedSpan, SpanCapture};

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "CRAG_LOG";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Filter from `CRAG_LOG`, then `RUST_LOG`, else `info`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a fmt subscriber for `service`. Later calls are no-ops.
pub fn init_telemetry(service: &str) {
    INITIALIZED.get_or_init(|| {
        let installed = tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(service, "telemetry initialized");
        }
    });
}

/// Install a JSON subscriber. Later calls are no-ops.
pub fn init_json() {
    INITIALIZED.get_or_init(|| {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init();
    });
}
