//! Access decision engine.
//!
//! The engine answers the question:
//! "May this actor perform an action requiring these roles and permissions on
//! a resource owned by this organization?"
//!
//! Gates, all of which must pass:
//! 1. the actor has a role at all;
//! 2. **role gate**: the role satisfies the route's declared roles, if any;
//! 3. **permission gate**: the role holds every required permission;
//! 4. **organization-scope gate**: Owner passes; Admin and Viewer pass only for
//!    their own organization.
//!
//! Denials are values, never errors.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

use super::models::{Actor, OrganizationId, OrganizationScope};
use super::roles::{Permission, Role, RoleModel};
use crate::config::AccessConfig;
use crate::error::{ErrorCode, TasktreeError};
use crate::telemetry::metrics::DecisionCounter;

// ═══════════════════════════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════════════════════════

/// One authorization check. Built fresh per request and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRequest {
    pub actor: Actor,
    pub scope: OrganizationScope,
    pub required_permissions: BTreeSet<Permission>,
    pub required_roles: Option<BTreeSet<Role>>,
}

impl AccessRequest {
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            scope: OrganizationScope::Undeclared,
            required_permissions: BTreeSet::new(),
            required_roles: None,
        }
    }

    /// Target a resource owned by `organization_id`.
    pub fn in_organization(mut self, organization_id: impl Into<OrganizationId>) -> Self {
        self.scope = OrganizationScope::Organization(organization_id.into());
        self
    }

    /// Declare that the action is not organization scoped.
    pub fn unscoped(mut self) -> Self {
        self.scope = OrganizationScope::Unscoped;
        self
    }

    pub fn with_scope(mut self, scope: OrganizationScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn require_permissions(
        mut self,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        self.required_permissions.extend(permissions);
        self
    }

    pub fn require_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.required_roles
            .get_or_insert_with(BTreeSet::new)
            .extend(roles);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum DenialReason {
    /// The actor carries no role.
    MissingRole,
    /// The request is organization scoped but the actor has no home organization.
    MissingOrganization,
    /// The actor's role is not among the route's declared roles.
    RoleNotPermitted { role: Role, required: Vec<Role> },
    /// The actor's role lacks some required permission.
    InsufficientPermissions { role: Role, missing: Vec<Permission> },
    /// The target organization is outside the actor's scope.
    OutsideOrganizationScope {
        actor_organization: OrganizationId,
        target: OrganizationId,
    },
    /// The request said nothing about its organization scope.
    UndeclaredScope,
}

impl DenialReason {
    /// Stable label for logs and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingRole => "missing_role",
            Self::MissingOrganization => "missing_organization",
            Self::RoleNotPermitted { .. } => "role_not_permitted",
            Self::InsufficientPermissions { .. } => "insufficient_permissions",
            Self::OutsideOrganizationScope { .. } => "outside_organization_scope",
            Self::UndeclaredScope => "undeclared_scope",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRole => write!(f, "actor has no role"),
            Self::MissingOrganization => write!(f, "actor has no organization"),
            Self::RoleNotPermitted { role, required } => {
                let required: Vec<&str> = required.iter().map(Role::as_str).collect();
                write!(f, "role {} is not one of [{}]", role, required.join(", "))
            }
            Self::InsufficientPermissions { role, missing } => {
                let missing: Vec<&str> = missing.iter().map(Permission::as_str).collect();
                write!(f, "role {} lacks [{}]", role, missing.join(", "))
            }
            Self::OutsideOrganizationScope {
                actor_organization,
                target,
            } => write!(
                f,
                "organization {} is outside the scope of organization {}",
                target, actor_organization
            ),
            Self::UndeclaredScope => write!(f, "request does not declare an organization scope"),
        }
    }
}

/// Result of an access evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "detail")]
pub enum Decision {
    Allow,
    Deny(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }

    pub fn reason(&self) -> Option<&DenialReason> {
        match self {
            Self::Allow => None,
            Self::Deny(reason) => Some(reason),
        }
    }

    /// Convert a denial into a `Forbidden` error for callers that use `?`.
    pub fn into_result(self) -> Result<(), TasktreeError> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(TasktreeError::new(ErrorCode::Forbidden, "Access denied")
                .with_internal_message(reason.to_string())
                .with_context("reason", reason.code())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// The single authorization chokepoint. Stateless apart from its configuration.
#[derive(Debug, Clone, Default)]
pub struct AccessDecision {
    config: AccessConfig,
}

impl AccessDecision {
    pub fn new(config: AccessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Evaluate with positional arguments.
    ///
    /// A `None` target is treated as an undeclared scope.
    pub fn check(
        &self,
        actor: &Actor,
        target_organization_id: Option<OrganizationId>,
        required_roles: Option<&[Role]>,
        required_permissions: &[Permission],
    ) -> Decision {
        let mut request = AccessRequest::new(actor.clone())
            .with_scope(target_organization_id.into())
            .require_permissions(required_permissions.iter().copied());
        if let Some(roles) = required_roles {
            request = request.require_roles(roles.iter().copied());
        }
        self.evaluate(&request)
    }

    /// Evaluate a request.
    pub fn evaluate(&self, request: &AccessRequest) -> Decision {
        let decision = match self.deny_reason(request) {
            Some(reason) => {
                debug!(
                    actor_id = %request.actor.id,
                    role = ?request.actor.role,
                    scope = ?request.scope,
                    reason = reason.code(),
                    "Access denied"
                );
                Decision::Deny(reason)
            }
            None => Decision::Allow,
        };
        DecisionCounter::record(&decision);
        decision
    }

    fn deny_reason(&self, request: &AccessRequest) -> Option<DenialReason> {
        let actor = &request.actor;
        let Some(role) = actor.role else {
            return Some(DenialReason::MissingRole);
        };

        if let Some(required) = &request.required_roles {
            if !RoleModel::satisfies_any_role(role, required) {
                return Some(DenialReason::RoleNotPermitted {
                    role,
                    required: required.iter().copied().collect(),
                });
            }
        }

        let missing = RoleModel::missing_permissions(role, &request.required_permissions);
        if !missing.is_empty() {
            return Some(DenialReason::InsufficientPermissions { role, missing });
        }

        self.scope_denial(actor, role, request.scope)
    }

    fn scope_denial(
        &self,
        actor: &Actor,
        role: Role,
        scope: OrganizationScope,
    ) -> Option<DenialReason> {
        let target = match scope {
            OrganizationScope::Organization(target) => target,
            OrganizationScope::Unscoped => return None,
            OrganizationScope::Undeclared => {
                if self.config.require_declared_scope {
                    return Some(DenialReason::UndeclaredScope);
                }
                warn!(
                    actor_id = %actor.id,
                    "Request carries no organization scope; scope gate skipped"
                );
                return None;
            }
        };

        let Some(home) = actor.organization_id else {
            return Some(DenialReason::MissingOrganization);
        };

        match role {
            Role::Owner => None,
            Role::Admin | Role::Viewer if home == target => None,
            Role::Admin | Role::Viewer => Some(DenialReason::OutsideOrganizationScope {
                actor_organization: home,
                target,
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
