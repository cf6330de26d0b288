//! Unified logging for diagnostics.
//!
//! Compact timestamped logging with per-module level configuration.
//! `RUST_LOG` takes precedence over config:
//!
//! ```bash
//! RUST_LOG=debug codatlas sync
//! RUST_LOG=codatlas::sync=trace codatlas sync
//! ```

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Compact time format: HH:MM:SS.mmm
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Initialize logging with configuration.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            let mut filter_str = config.default.clone();
            for (module, level) in &config.modules {
                filter_str.push_str(&format!(",codatlas::{module}={level}"));
            }
            EnvFilter::new(&filter_str)
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        tracing_subscriber::registry().with(fmt_layer).init();
    });
}

/// Initialize logging with the default (quiet) configuration.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}
