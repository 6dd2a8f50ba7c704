//! Prometheus metrics for access decisions, hierarchy anomalies and audit
//! attribution.
//!
//! Recording goes through the `metrics` facade, so every recorder below is a
//! no-op until [`init_metrics`] installs the Prometheus exporter.
//!
//! ```rust,no_run
//! use tasktree_core::telemetry::metrics::{HierarchyAnomalyCounter, AuditFallbackCounter};
//!
//! HierarchyAnomalyCounter::increment("revisited");
//! AuditFallbackCounter::increment("not_found");
//! ```

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::rbac::policy::Decision;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Labels attached to every series.
    #[serde(default)]
    pub global_labels: BTreeMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            global_labels: BTreeMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

/// Handle to the installed recorder, if any.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format. Empty when disabled.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder.
///
/// The embedding application decides how to expose [`MetricsRegistry::render`].
///
/// # Errors
///
/// Fails when a global recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    let handle = builder.install_recorder()?;

    register_metric_descriptions();
    tracing::info!(global_labels = config.global_labels.len(), "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!(
        "tasktree_access_decisions_total",
        "Access decisions by outcome and denial reason"
    );
    describe_counter!(
        "tasktree_hierarchy_anomalies_total",
        "Cycles, mismatched parent links, failed lookups and depth cutoffs seen during traversal"
    );
    describe_counter!(
        "tasktree_audit_attribution_fallbacks_total",
        "Audit entries attributed to the acting user instead of the organization admin"
    );
    describe_counter!(
        "tasktree_audit_dropped_total",
        "Audit entries dropped because the sink channel was full or closed"
    );
    describe_counter!("tasktree_errors_total", "Errors by code and category");
}

// ═══════════════════════════════════════════════════════════════════════════════
// Recorders
// ═══════════════════════════════════════════════════════════════════════════════

/// Counts access decisions.
pub struct DecisionCounter;

impl DecisionCounter {
    pub fn record(decision: &Decision) {
        let (outcome, reason) = match decision {
            Decision::Allow => ("allow", "none"),
            Decision::Deny(reason) => ("deny", reason.code()),
        };
        counter!(
            "tasktree_access_decisions_total",
            "outcome" => outcome,
            "reason" => reason,
        )
        .increment(1);
    }
}

/// Counts traversal anomalies by kind.
pub struct HierarchyAnomalyCounter;

impl HierarchyAnomalyCounter {
    pub fn increment(kind: &'static str) {
        counter!("tasktree_hierarchy_anomalies_total", "kind" => kind).increment(1);
    }
}

/// Counts audit attribution fallbacks and dropped entries.
pub struct AuditFallbackCounter;

impl AuditFallbackCounter {
    pub fn increment(cause: &'static str) {
        counter!("tasktree_audit_attribution_fallbacks_total", "cause" => cause).increment(1);
    }

    pub fn dropped(cause: &'static str) {
        counter!("tasktree_audit_dropped_total", "cause" => cause).increment(1);
    }
}
