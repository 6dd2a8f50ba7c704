//! In-memory organization and member directory.
//!
//! Implements the lookups the access-control core consumes. Used by the CLI,
//! the tests, and any embedding that keeps its hierarchy in memory.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::audit::AdminLookup;
use super::hierarchy::{ChildrenLookup, OrganizationLookup};
use super::models::{LookupError, Organization, OrganizationId, UserId};
use super::roles::Role;

/// A user as the directory knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    pub organization_id: OrganizationId,
}

impl Member {
    pub fn new(
        id: impl Into<UserId>,
        name: impl Into<String>,
        role: Role,
        organization_id: impl Into<OrganizationId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            organization_id: organization_id.into(),
        }
    }
}

/// Serializable export of a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Thread-safe directory keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    organizations: DashMap<OrganizationId, Organization>,
    members: DashMap<UserId, Member>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let directory = Self::new();
        for organization in snapshot.organizations {
            directory.insert_organization(organization);
        }
        for member in snapshot.members {
            directory.insert_member(member);
        }
        directory
    }

    /// Export the current contents, sorted by id.
    pub fn snapshot(&self) -> DirectorySnapshot {
        let mut organizations: Vec<Organization> =
            self.organizations.iter().map(|o| o.value().clone()).collect();
        organizations.sort_by_key(|o| o.id);
        let mut members: Vec<Member> = self.members.iter().map(|m| m.value().clone()).collect();
        members.sort_by_key(|m| m.id);
        DirectorySnapshot {
            organizations,
            members,
        }
    }

    /// Insert or replace an organization. Returns the previous value.
    pub fn insert_organization(&self, organization: Organization) -> Option<Organization> {
        self.organizations.insert(organization.id, organization)
    }

    pub fn remove_organization(&self, organization_id: OrganizationId) -> Option<Organization> {
        self.organizations.remove(&organization_id).map(|(_, o)| o)
    }

    pub fn get_organization(&self, organization_id: OrganizationId) -> Option<Organization> {
        self.organizations.get(&organization_id).map(|o| o.clone())
    }

    /// Organizations without a parent, sorted by id.
    pub fn roots(&self) -> Vec<Organization> {
        let mut roots: Vec<Organization> = self
            .organizations
            .iter()
            .filter(|o| o.is_root())
            .map(|o| o.value().clone())
            .collect();
        roots.sort_by_key(|o| o.id);
        roots
    }

    pub fn insert_member(&self, member: Member) -> Option<Member> {
        self.members.insert(member.id, member)
    }

    pub fn remove_member(&self, user_id: UserId) -> Option<Member> {
        self.members.remove(&user_id).map(|(_, m)| m)
    }

    pub fn get_member(&self, user_id: UserId) -> Option<Member> {
        self.members.get(&user_id).map(|m| m.clone())
    }

    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }
}

impl ChildrenLookup for InMemoryDirectory {
    fn children_of(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Organization>, LookupError> {
        let mut children: Vec<Organization> = self
            .organizations
            .iter()
            .filter(|o| o.parent_id == Some(organization_id))
            .map(|o| o.value().clone())
            .collect();
        children.sort_by_key(|o| o.id);
        Ok(children)
    }
}

impl OrganizationLookup for InMemoryDirectory {
    fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, LookupError> {
        Ok(self.get_organization(organization_id))
    }
}

impl AdminLookup for InMemoryDirectory {
    /// The lowest-id Admin member of the organization.
    fn find_admin_in_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<UserId>, LookupError> {
        Ok(self
            .members
            .iter()
            .filter(|m| m.role == Role::Admin && m.organization_id == organization_id)
            .map(|m| m.id)
            .min())
    }
}
