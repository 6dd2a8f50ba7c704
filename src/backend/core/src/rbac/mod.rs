//! Role-based access control over an organization hierarchy.
//!
//! This module provides:
//! - **Models**: Actor, Organization, and request scope
//! - **Roles**: Owner / Admin / Viewer with their permission sets
//! - **Hierarchy**: bounded breadth-first queries over the organization forest
//! - **Policy**: the access decision engine (role gate, permission gate, scope gate)
//! - **Organizations**: ownership and structure checks for hierarchy mutations
//! - **Audit**: role-specific attribution and non-blocking recording
//! - **Store**: an in-memory directory implementing the lookups above
//! - **Middleware**: a tower layer enforcing decisions per request
//!
//! # Usage
//!
//! ```rust,ignore
//! use tasktree_core::rbac::{AccessDecision, AccessRequest, Actor, Permission, Role};
//!
//! let engine = AccessDecision::default();
//! let actor = Actor::new(9, Role::Admin, 2);
//!
//! let decision = engine.evaluate(
//!     &AccessRequest::new(actor)
//!         .in_organization(2)
//!         .require_permissions([Permission::Write]),
//! );
//! assert!(decision.is_allowed());
//! ```

pub mod audit;
pub mod hierarchy;
pub mod middleware;
pub mod models;
pub mod organizations;
pub mod policy;
pub mod roles;
pub mod store;

pub use audit::{
    AdminLookup, AttributionBasis, AuditAttribution, AuditContextResolver, AuditEntry, AuditEvent,
    AuditLogger, AuditSink, AuditTrail,
};
pub use hierarchy::{
    ChildrenLookup, HierarchyAnomaly, OrganizationLookup, OrganizationTree, Traversal,
};
pub use middleware::{AccessContext, RequireAccessLayer, RequireAccessService};
pub use models::{Actor, LookupError, Organization, OrganizationId, OrganizationScope, UserId};
pub use organizations::{OrganizationGuard, OrganizationMutationError};
pub use policy::{AccessDecision, AccessRequest, Decision, DenialReason};
pub use roles::{ParseError, Permission, Role, RoleModel};
pub use store::{DirectorySnapshot, InMemoryDirectory, Member};
