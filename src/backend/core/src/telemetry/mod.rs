//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: JSON/pretty/compact output with sensitive field redaction
//! - **Metrics**: decision, anomaly and audit fallback counters
//!
//! # Example
//!
//! ```rust,no_run
//! use tasktree_core::{config::Config, telemetry::init_telemetry};
//!
//! let config = Config::load().expect("config");
//! let handle = init_telemetry(&config).expect("telemetry");
//! println!("{}", handle.metrics.render());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, RedactionConfig, SensitiveFieldRedactor};
pub use metrics::{
    init_metrics, AuditFallbackCounter, DecisionCounter, HierarchyAnomalyCounter, MetricsConfig,
    MetricsRegistry,
};

use crate::config::Config;

/// Initialize logging and metrics from the loaded configuration.
///
/// # Errors
///
/// Fails if either subsystem is already initialized or misconfigured.
pub fn init_telemetry(config: &Config) -> anyhow::Result<TelemetryHandle> {
    init_logging(&config.logging)?;
    let metrics = init_metrics(&config.metrics)?;

    ::tracing::info!(
        require_declared_scope = config.access.require_declared_scope,
        max_traversal_depth = ?config.access.max_traversal_depth,
        "Telemetry initialized"
    );

    Ok(TelemetryHandle { metrics })
}

/// Keeps the metrics registry alive for the process lifetime.
#[derive(Debug)]
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
}
