//! RBAC data models: identifiers, Organization, Actor, and request scope.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::roles::Role;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Strongly-typed organization identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub i64);

impl OrganizationId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrganizationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organization
// ═══════════════════════════════════════════════════════════════════════════════

/// A node in the organization forest.
///
/// Organizations with no `parent_id` are roots. The forest must never contain a
/// cycle; mutations are checked against [`OrganizationTree::would_create_cycle`]
/// before they are committed.
///
/// [`OrganizationTree::would_create_cycle`]: super::hierarchy::OrganizationTree::would_create_cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<OrganizationId>,
}

impl Organization {
    /// Create a root organization.
    pub fn root(id: impl Into<OrganizationId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
        }
    }

    /// Create an organization nested under `parent_id`.
    pub fn child(
        id: impl Into<OrganizationId>,
        name: impl Into<String>,
        parent_id: impl Into<OrganizationId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: Some(parent_id.into()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Actor
// ═══════════════════════════════════════════════════════════════════════════════

/// The resolved identity performing a request.
///
/// Derived once per request by the authentication collaborator. Role and home
/// organization are optional because upstream identity data can be incomplete;
/// every check fails closed when a field it needs is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub organization_id: Option<OrganizationId>,
}

impl Actor {
    /// Create a fully resolved actor.
    pub fn new(
        id: impl Into<UserId>,
        role: Role,
        organization_id: impl Into<OrganizationId>,
    ) -> Self {
        Self {
            id: id.into(),
            role: Some(role),
            organization_id: Some(organization_id.into()),
        }
    }

    /// Create an actor with only an identity; role and organization are unset.
    pub fn unresolved(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            role: None,
            organization_id: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<OrganizationId>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn is_owner(&self) -> bool {
        self.role == Some(Role::Owner)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organization scope
// ═══════════════════════════════════════════════════════════════════════════════

/// What a request declares about the organization it targets.
///
/// `Undeclared` means the caller supplied nothing at all, which is distinct
/// from a route explicitly opting out with `Unscoped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "organization_id")]
pub enum OrganizationScope {
    #[default]
    Undeclared,
    Unscoped,
    Organization(OrganizationId),
}

impl OrganizationScope {
    pub fn target(&self) -> Option<OrganizationId> {
        match self {
            Self::Organization(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<Option<OrganizationId>> for OrganizationScope {
    fn from(target: Option<OrganizationId>) -> Self {
        match target {
            Some(id) => Self::Organization(id),
            None => Self::Undeclared,
        }
    }
}

impl From<OrganizationId> for OrganizationScope {
    fn from(id: OrganizationId) -> Self {
        Self::Organization(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by an injected lookup collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Lookup backend unavailable: {0}")]
    Unavailable(String),

    #[error("Lookup timed out after {0}ms")]
    Timeout(u64),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_organization_constructors() {
        let root = Organization::root(1, "Acme");
        assert!(root.is_root());

        let child = Organization::child(2, "Acme EU", 1);
        assert_eq!(child.parent_id, Some(OrganizationId::new(1)));
        assert!(!child.is_root());
    }

    #[test]
    fn test_actor_builders() {
        let actor = Actor::unresolved(7).with_role(Role::Admin).with_organization(3);
        assert_eq!(actor, Actor::new(7, Role::Admin, 3));
        assert!(!actor.is_owner());
        assert!(Actor::new(1, Role::Owner, 1).is_owner());
    }

    #[test]
    fn test_scope_from_option() {
        assert_eq!(OrganizationScope::from(None), OrganizationScope::Undeclared);
        assert_eq!(
            OrganizationScope::from(Some(OrganizationId::new(4))),
            OrganizationScope::Organization(OrganizationId::new(4))
        );
        assert_eq!(OrganizationScope::Unscoped.target(), None);
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let org = Organization::child(5, "Ops", 1);
        let json = serde_json::to_value(&org).unwrap();
        assert_eq!(json["id"], 5);
        assert_eq!(json["parent_id"], 1);

        let root: Organization = serde_json::from_str(r#"{"id":1,"name":"Root"}"#).unwrap();
        assert!(root.is_root());
    }
}
