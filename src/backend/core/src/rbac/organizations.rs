//! Authorization for structural changes to the organization forest.
//!
//! Ownership is always checked against the organization that ends up as the
//! parent: creating or reparenting under `P` requires the actor to own `P`,
//! meaning `P` lies in the subtree of the actor's home organization.

use thiserror::Error;
use tracing::{debug, info};

use super::hierarchy::{ChildrenLookup, OrganizationLookup, OrganizationTree};
use super::models::{Actor, LookupError, Organization, OrganizationId};
use super::roles::Role;
use crate::error::{ErrorCode, TasktreeError};

/// Reasons a structural change is refused.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrganizationMutationError {
    #[error("Actor has no role or no home organization")]
    MalformedActor,

    #[error("Only owners may change the organization hierarchy (role: {0})")]
    NotOwner(Role),

    #[error("Actor does not own organization {0}")]
    NotOwnerOf(OrganizationId),

    #[error("Organization not found: {0}")]
    NotFound(OrganizationId),

    #[error("Making {parent} the parent of {node} would create a cycle")]
    CycleDetected {
        node: OrganizationId,
        parent: OrganizationId,
    },

    #[error("Organization {organization} still has {children} child organization(s)")]
    HasChildren {
        organization: OrganizationId,
        children: usize,
    },

    #[error("Hierarchy lookup failed: {0}")]
    Lookup(#[from] LookupError),
}

impl From<OrganizationMutationError> for TasktreeError {
    fn from(err: OrganizationMutationError) -> Self {
        let code = match &err {
            OrganizationMutationError::MalformedActor => ErrorCode::MalformedActor,
            OrganizationMutationError::NotOwner(_)
            | OrganizationMutationError::NotOwnerOf(_) => ErrorCode::Forbidden,
            OrganizationMutationError::NotFound(_) => ErrorCode::OrganizationNotFound,
            OrganizationMutationError::CycleDetected { .. } => ErrorCode::HierarchyCycle,
            OrganizationMutationError::HasChildren { .. } => ErrorCode::OrganizationHasChildren,
            OrganizationMutationError::Lookup(_) => ErrorCode::LookupFailed,
        };
        TasktreeError::new(code, err.to_string())
    }
}

/// Checks create, rename, reparent, and delete requests against the hierarchy.
#[derive(Debug, Clone)]
pub struct OrganizationGuard<L> {
    tree: OrganizationTree<L>,
}

impl<L> OrganizationGuard<L>
where
    L: ChildrenLookup + OrganizationLookup,
{
    pub fn new(tree: OrganizationTree<L>) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &OrganizationTree<L> {
        &self.tree
    }

    /// Create an organization under `parent_id`, or a new root when `None`.
    pub fn authorize_create(
        &self,
        actor: &Actor,
        parent_id: Option<OrganizationId>,
    ) -> Result<(), OrganizationMutationError> {
        let home = require_owner(actor)?;
        if let Some(parent) = parent_id {
            self.require_exists(parent)?;
            self.require_owns(home, parent)?;
        }
        debug!(actor_id = %actor.id, parent = ?parent_id, "Organization create authorized");
        Ok(())
    }

    /// Rename `organization_id` in place.
    pub fn authorize_rename(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
    ) -> Result<(), OrganizationMutationError> {
        let home = require_owner(actor)?;
        self.require_exists(organization_id)?;
        self.require_owns(home, organization_id)
    }

    /// Move `organization_id` under `new_parent_id`, or make it a root when `None`.
    pub fn authorize_reparent(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
        new_parent_id: Option<OrganizationId>,
    ) -> Result<(), OrganizationMutationError> {
        let home = require_owner(actor)?;
        self.require_exists(organization_id)?;
        self.require_owns(home, organization_id)?;

        if let Some(parent) = new_parent_id {
            if parent == organization_id {
                return Err(OrganizationMutationError::CycleDetected {
                    node: organization_id,
                    parent,
                });
            }
            self.require_exists(parent)?;
            self.require_owns(home, parent)?;
            if self.tree.would_create_cycle(organization_id, parent) {
                return Err(OrganizationMutationError::CycleDetected {
                    node: organization_id,
                    parent,
                });
            }
        }

        info!(
            actor_id = %actor.id,
            organization = %organization_id,
            new_parent = ?new_parent_id,
            "Organization reparent authorized"
        );
        Ok(())
    }

    /// Delete `organization_id`; it must have no child organizations.
    pub fn authorize_delete(
        &self,
        actor: &Actor,
        organization_id: OrganizationId,
    ) -> Result<(), OrganizationMutationError> {
        let home = require_owner(actor)?;
        self.require_exists(organization_id)?;
        self.require_owns(home, organization_id)?;

        let children = self.tree.lookup().children_of(organization_id)?;
        if !children.is_empty() {
            return Err(OrganizationMutationError::HasChildren {
                organization: organization_id,
                children: children.len(),
            });
        }
        Ok(())
    }

    fn require_exists(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Organization, OrganizationMutationError> {
        self.tree
            .lookup()
            .find_organization(organization_id)?
            .ok_or(OrganizationMutationError::NotFound(organization_id))
    }

    fn require_owns(
        &self,
        home: OrganizationId,
        organization_id: OrganizationId,
    ) -> Result<(), OrganizationMutationError> {
        if home == organization_id || self.tree.is_descendant_of(organization_id, home) {
            Ok(())
        } else {
            Err(OrganizationMutationError::NotOwnerOf(organization_id))
        }
    }
}

fn require_owner(actor: &Actor) -> Result<OrganizationId, OrganizationMutationError> {
    match (actor.role, actor.organization_id) {
        (Some(Role::Owner), Some(home)) => Ok(home),
        (Some(role), Some(_)) => Err(OrganizationMutationError::NotOwner(role)),
        _ => Err(OrganizationMutationError::MalformedActor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::store::InMemoryDirectory;
    use std::sync::Arc;

    fn org(id: i64) -> OrganizationId {
        OrganizationId::new(id)
    }

    /// Two separate trees: 1 -> {2 -> 3} and 10 -> 11.
    fn guard() -> OrganizationGuard<Arc<InMemoryDirectory>> {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert_organization(Organization::root(1, "acme"));
        directory.insert_organization(Organization::child(2, "acme-eu", 1));
        directory.insert_organization(Organization::child(3, "acme-de", 2));
        directory.insert_organization(Organization::root(10, "globex"));
        directory.insert_organization(Organization::child(11, "globex-us", 10));
        OrganizationGuard::new(OrganizationTree::new(directory))
    }

    #[test]
    fn test_create_requires_owner_of_parent() {
        let guard = guard();
        let owner = Actor::new(1, Role::Owner, 1);
        assert!(guard.authorize_create(&owner, Some(org(3))).is_ok());
        assert!(guard.authorize_create(&owner, None).is_ok());
        assert_eq!(
            guard.authorize_create(&owner, Some(org(11))),
            Err(OrganizationMutationError::NotOwnerOf(org(11)))
        );
        assert_eq!(
            guard.authorize_create(&owner, Some(org(77))),
            Err(OrganizationMutationError::NotFound(org(77)))
        );
    }

    #[test]
    fn test_non_owner_refused() {
        let guard = guard();
        let admin = Actor::new(2, Role::Admin, 2);
        assert_eq!(
            guard.authorize_create(&admin, Some(org(2))),
            Err(OrganizationMutationError::NotOwner(Role::Admin))
        );
        assert_eq!(
            guard.authorize_delete(&Actor::unresolved(5), org(3)),
            Err(OrganizationMutationError::MalformedActor)
        );
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let guard = guard();
        let owner = Actor::new(1, Role::Owner, 1);
        assert_eq!(
            guard.authorize_reparent(&owner, org(1), Some(org(3))),
            Err(OrganizationMutationError::CycleDetected {
                node: org(1),
                parent: org(3)
            })
        );
        assert_eq!(
            guard.authorize_reparent(&owner, org(2), Some(org(2))),
            Err(OrganizationMutationError::CycleDetected {
                node: org(2),
                parent: org(2)
            })
        );
        assert!(guard.authorize_reparent(&owner, org(3), Some(org(1))).is_ok());
        assert!(guard.authorize_reparent(&owner, org(3), None).is_ok());
    }

    #[test]
    fn test_delete_requires_leaf() {
        let guard = guard();
        let owner = Actor::new(1, Role::Owner, 1);
        assert_eq!(
            guard.authorize_delete(&owner, org(2)),
            Err(OrganizationMutationError::HasChildren {
                organization: org(2),
                children: 1
            })
        );
        assert!(guard.authorize_delete(&owner, org(3)).is_ok());
        assert!(guard.authorize_rename(&owner, org(2)).is_ok());
    }

    #[test]
    fn test_error_codes() {
        let err: TasktreeError = OrganizationMutationError::HasChildren {
            organization: org(2),
            children: 3,
        }
        .into();
        assert_eq!(err.code(), ErrorCode::OrganizationHasChildren);
        assert_eq!(err.http_status().as_u16(), 409);

        let err: TasktreeError = OrganizationMutationError::MalformedActor.into();
        assert_eq!(err.code(), ErrorCode::MalformedActor);
        assert_eq!(err.http_status().as_u16(), 403);
    }
}
