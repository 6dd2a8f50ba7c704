//! Built-in roles, permissions, and role precedence.
//!
//! Tasktree ships with three roles:
//!
//! | Role   | Permissions           | Route gating                              |
//! |--------|-----------------------|-------------------------------------------|
//! | Owner  | read, write, admin    | Owner routes, and every Admin route       |
//! | Admin  | read, write           | Admin routes only                         |
//! | Viewer | read                  | Viewer routes only                        |
//!
//! [`Role::permissions`] is the only place the role → permission mapping lives.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A capability granted by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    pub const ALL: [Permission; 3] = [Self::Read, Self::Write, Self::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            other => Err(ParseError::UnknownPermission(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// The fixed set of roles an actor can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 3] = [Self::Owner, Self::Admin, Self::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Viewer => "viewer",
        }
    }

    /// The permissions this role grants.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Self::Owner => &[Permission::Read, Permission::Write, Permission::Admin],
            Self::Admin => &[Permission::Read, Permission::Write],
            Self::Viewer => &[Permission::Read],
        }
    }

    /// Roles whose gated routes this role may also use, besides its own.
    ///
    /// Owner may use Admin routes. There are no other promotions.
    fn promoted_to(&self) -> &'static [Role] {
        match self {
            Self::Owner => &[Role::Admin],
            Self::Admin | Self::Viewer => &[],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "viewer" => Ok(Self::Viewer),
            other => Err(ParseError::UnknownRole(other.to_string())),
        }
    }
}

/// Error parsing a role or permission name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Unknown permission: {0}")]
    UnknownPermission(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role model
// ═══════════════════════════════════════════════════════════════════════════════

/// Static role → permission mapping and role-precedence checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleModel;

impl RoleModel {
    /// Permission set held by `role`.
    pub fn permissions_of(role: Role) -> BTreeSet<Permission> {
        role.permissions().iter().copied().collect()
    }

    /// True iff `role` holds every permission in `required`.
    pub fn satisfies<'a, I>(role: Role, required: I) -> bool
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        let held = role.permissions();
        required.into_iter().all(|p| held.contains(p))
    }

    /// Permissions in `required` that `role` does not hold, in order.
    pub fn missing_permissions<'a, I>(role: Role, required: I) -> Vec<Permission>
    where
        I: IntoIterator<Item = &'a Permission>,
    {
        let held = role.permissions();
        let missing: BTreeSet<Permission> = required
            .into_iter()
            .filter(|p| !held.contains(p))
            .copied()
            .collect();
        missing.into_iter().collect()
    }

    /// True iff `role` is in `required`, or is promoted to a role that is.
    pub fn satisfies_any_role<'a, I>(role: Role, required: I) -> bool
    where
        I: IntoIterator<Item = &'a Role>,
    {
        required
            .into_iter()
            .any(|r| *r == role || role.promoted_to().contains(r))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
