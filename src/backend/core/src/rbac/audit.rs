//! Audit attribution and recording.
//!
//! Attribution rules:
//! - Owner actions are recorded against the reserved system identity.
//! - Admin actions are recorded against the first Admin of the actor's
//!   organization, falling back to the actor when none can be found.
//! - Everyone else is recorded as themselves.
//!
//! Attribution never fails: a broken lookup falls back instead of blocking the
//! action being audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::models::{Actor, LookupError, OrganizationId, UserId};
use super::roles::Role;
use crate::config::AuditConfig;
use crate::telemetry::logging::SensitiveFieldRedactor;
use crate::telemetry::metrics::AuditFallbackCounter;

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator interface
// ═══════════════════════════════════════════════════════════════════════════════

/// Finds an Admin-role user in an organization.
pub trait AdminLookup: Send + Sync {
    fn find_admin_in_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<UserId>, LookupError>;
}

impl<T: AdminLookup + ?Sized> AdminLookup for Arc<T> {
    fn find_admin_in_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<UserId>, LookupError> {
        (**self).find_admin_in_organization(organization_id)
    }
}

impl<T: AdminLookup + ?Sized> AdminLookup for &T {
    fn find_admin_in_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<UserId>, LookupError> {
        (**self).find_admin_in_organization(organization_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Event and attribution
// ═══════════════════════════════════════════════════════════════════════════════

/// An audited action, as described by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub details: Value,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            target_id: None,
            details: Value::Null,
        }
    }

    pub fn with_target(mut self, target_id: impl ToString) -> Self {
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Which rule produced an attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionBasis {
    /// Owner action recorded as a system event.
    System,
    /// Admin action recorded against the organization's admin.
    OrganizationAdmin,
    /// Recorded against the acting user.
    Actor,
    /// Admin action recorded against the acting user because no admin was found.
    Fallback,
}

/// Who an audit entry is stamped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAttribution {
    pub user_id: UserId,
    pub organization_id: Option<OrganizationId>,
    pub basis: AttributionBasis,
}

impl AuditAttribution {
    /// `(user, organization)` as plain values.
    pub fn pair(&self) -> (UserId, Option<OrganizationId>) {
        (self.user_id, self.organization_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resolver
// ═══════════════════════════════════════════════════════════════════════════════

/// Decides the attribution for audited actions.
#[derive(Debug, Clone)]
pub struct AuditContextResolver<L> {
    lookup: L,
    system_user_id: UserId,
    system_organization_id: OrganizationId,
}

impl<L: AdminLookup> AuditContextResolver<L> {
    pub fn new(lookup: L, config: &AuditConfig) -> Self {
        Self {
            lookup,
            system_user_id: config.system_user_id,
            system_organization_id: config.system_organization_id,
        }
    }

    pub fn system_identity(&self) -> (UserId, OrganizationId) {
        (self.system_user_id, self.system_organization_id)
    }

    /// Attribute `event` performed by `actor`.
    ///
    /// Performs at most one lookup, and only for Admin actors.
    pub fn resolve(&self, actor: &Actor, event: &AuditEvent) -> AuditAttribution {
        let attribution = match (actor.role, actor.organization_id) {
            (Some(Role::Owner), _) => AuditAttribution {
                user_id: self.system_user_id,
                organization_id: Some(self.system_organization_id),
                basis: AttributionBasis::System,
            },
            (Some(Role::Admin), Some(organization_id)) => {
                self.resolve_admin(actor, organization_id, event)
            }
            _ => self.as_actor(actor, AttributionBasis::Actor),
        };

        debug!(
            actor_id = %actor.id,
            action = %event.action,
            attributed_user = %attribution.user_id,
            basis = ?attribution.basis,
            "Audit attribution resolved"
        );
        attribution
    }

    fn resolve_admin(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
        event: &AuditEvent,
    ) -> AuditAttribution {
        match self.lookup.find_admin_in_organization(organization_id) {
            Ok(Some(admin_id)) => AuditAttribution {
                user_id: admin_id,
                organization_id: Some(organization_id),
                basis: AttributionBasis::OrganizationAdmin,
            },
            Ok(None) => {
                warn!(
                    actor_id = %actor.id,
                    organization = %organization_id,
                    action = %event.action,
                    "No admin found in organization; attributing to actor"
                );
                AuditFallbackCounter::increment("not_found");
                self.as_actor(actor, AttributionBasis::Fallback)
            }
            Err(e) => {
                warn!(
                    actor_id = %actor.id,
                    organization = %organization_id,
                    action = %event.action,
                    error = %e,
                    "Admin lookup failed; attributing to actor"
                );
                AuditFallbackCounter::increment("lookup_failed");
                self.as_actor(actor, AttributionBasis::Fallback)
            }
        }
    }

    fn as_actor(&self, actor: &Actor, basis: AttributionBasis) -> AuditAttribution {
        AuditAttribution {
            user_id: actor.id,
            organization_id: actor.organization_id,
            basis,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entries and sinks
// ═══════════════════════════════════════════════════════════════════════════════

/// A recorded audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub attributed_user_id: UserId,
    pub attributed_organization_id: Option<OrganizationId>,
    pub action: String,
    pub target_id: Option<String>,
    pub details: Value,
}

impl AuditEntry {
    /// Build an entry; detail fields with sensitive names are redacted.
    pub fn new(attribution: &AuditAttribution, event: AuditEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            attributed_user_id: attribution.user_id,
            attributed_organization_id: attribution.organization_id,
            action: event.action,
            target_id: event.target_id,
            details: redact_details(event.details, SensitiveFieldRedactor::global()),
        }
    }
}

/// Replace the values of sensitive keys, recursively.
pub fn redact_details(value: Value, redactor: &SensitiveFieldRedactor) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    if redactor.should_redact_field(&key) {
                        (key, Value::String(redactor.replacement().to_string()))
                    } else {
                        (key, redact_details(v, redactor))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| redact_details(v, redactor))
                .collect(),
        ),
        Value::String(s) => Value::String(redactor.redact_value(&s)),
        other => other,
    }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Record an entry. Must not block the caller.
    fn record(&self, entry: AuditEntry);
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn record(&self, entry: AuditEntry) {
        (**self).record(entry)
    }
}

/// Channel-backed sink. Entries are handed to a consumer task; a full or
/// closed channel drops the entry with a warning.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    sender: mpsc::Sender<AuditEntry>,
}

impl AuditLogger {
    /// A logger and the receiving end, for callers that persist entries themselves.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AuditEntry>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }

    /// A logger whose entries are written to the `audit` tracing target.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(buffer: usize) -> (Self, JoinHandle<()>) {
        let (logger, mut receiver) = Self::channel(buffer);
        let handle = tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                info!(
                    target: "audit",
                    user_id = %entry.attributed_user_id,
                    organization_id = ?entry.attributed_organization_id,
                    action = %entry.action,
                    target_id = ?entry.target_id,
                    details = %entry.details,
                    "AUDIT"
                );
            }
        });
        (logger, handle)
    }
}

impl AuditSink for AuditLogger {
    fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.sender.try_send(entry) {
            let cause = match e {
                mpsc::error::TrySendError::Full(_) => "channel_full",
                mpsc::error::TrySendError::Closed(_) => "channel_closed",
            };
            warn!(cause, "Dropping audit entry");
            AuditFallbackCounter::dropped(cause);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Trail
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolver and sink together: attribute, then record.
#[derive(Debug, Clone)]
pub struct AuditTrail<L, S> {
    resolver: AuditContextResolver<L>,
    sink: S,
}

impl<L: AdminLookup, S: AuditSink> AuditTrail<L, S> {
    pub fn new(resolver: AuditContextResolver<L>, sink: S) -> Self {
        Self { resolver, sink }
    }

    pub fn resolver(&self) -> &AuditContextResolver<L> {
        &self.resolver
    }

    /// Record an already attributed event.
    pub fn record(&self, attribution: &AuditAttribution, event: AuditEvent) {
        self.sink.record(AuditEntry::new(attribution, event));
    }

    /// Resolve attribution for `actor`, then record the event.
    pub fn record_action(&self, actor: &Actor, event: AuditEvent) -> AuditAttribution {
        let attribution = self.resolver.resolve(actor, &event);
        self.record(&attribution, event);
        attribution
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
