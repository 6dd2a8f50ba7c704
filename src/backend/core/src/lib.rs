#![allow(clippy::result_large_err)]
//! # Tasktree Core
//!
//! Multi-tenant access control over an organization hierarchy.
//!
//! ## Architecture
//!
//! - **Organization Tree**: bounded, cycle-safe subtree queries over the organization forest
//! - **Role Model**: Owner / Admin / Viewer and the permissions each carries
//! - **Access Decision**: role, permission and organization-scope gates producing allow/deny
//! - **Organization Guard**: ownership and structure checks before hierarchy mutations
//! - **Audit**: role-specific attribution and a non-blocking audit logger
//! - **Middleware**: tower layer enforcing access decisions per request
//! - **Telemetry**: structured logging with redaction and Prometheus counters

pub mod config;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, Result, TasktreeError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AccessConfig, AuditConfig, Config};
    pub use crate::error::{ErrorCode, Result, TasktreeError};
    pub use crate::rbac::{
        AccessContext, AccessDecision, AccessRequest, Actor, AdminLookup, AttributionBasis,
        AuditAttribution, AuditContextResolver, AuditEntry, AuditEvent, AuditLogger, AuditSink,
        AuditTrail, ChildrenLookup, Decision, DenialReason, DirectorySnapshot, InMemoryDirectory,
        LookupError, Member, Organization, OrganizationGuard, OrganizationId, OrganizationLookup,
        OrganizationMutationError, OrganizationScope, OrganizationTree, Permission,
        RequireAccessLayer, Role, RoleModel, Traversal, UserId,
    };
}
