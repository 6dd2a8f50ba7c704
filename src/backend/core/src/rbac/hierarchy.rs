//! Organization hierarchy queries.
//!
//! All traversal in the crate goes through [`OrganizationTree`]. The walk is
//! breadth-first from a root, follows child links returned by a
//! [`ChildrenLookup`] collaborator, and never visits an id twice, so corrupted
//! parent links (cycles, a child listed under two parents) cannot make it loop.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::models::{LookupError, Organization, OrganizationId};
use crate::telemetry::metrics::HierarchyAnomalyCounter;

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator interfaces
// ═══════════════════════════════════════════════════════════════════════════════

/// Returns the immediate children of an organization.
pub trait ChildrenLookup: Send + Sync {
    fn children_of(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Organization>, LookupError>;
}

/// Resolves a single organization by id.
pub trait OrganizationLookup: Send + Sync {
    fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, LookupError>;
}

impl<T: ChildrenLookup + ?Sized> ChildrenLookup for Arc<T> {
    fn children_of(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Organization>, LookupError> {
        (**self).children_of(organization_id)
    }
}

impl<T: ChildrenLookup + ?Sized> ChildrenLookup for &T {
    fn children_of(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Organization>, LookupError> {
        (**self).children_of(organization_id)
    }
}

impl<T: OrganizationLookup + ?Sized> OrganizationLookup for Arc<T> {
    fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, LookupError> {
        (**self).find_organization(organization_id)
    }
}

impl<T: OrganizationLookup + ?Sized> OrganizationLookup for &T {
    fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, LookupError> {
        (**self).find_organization(organization_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Traversal result
// ═══════════════════════════════════════════════════════════════════════════════

/// Something inconsistent met while walking the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HierarchyAnomaly {
    /// A child link pointed back at an already visited organization.
    Revisited {
        organization_id: OrganizationId,
        via: OrganizationId,
    },
    /// The lookup listed a child whose `parent_id` is some other organization.
    ParentMismatch {
        organization_id: OrganizationId,
        listed_under: OrganizationId,
        parent_id: Option<OrganizationId>,
    },
    /// The children of an organization could not be loaded.
    LookupFailed {
        organization_id: OrganizationId,
        error: String,
    },
    /// The configured depth bound stopped the walk at this organization.
    DepthLimitReached { organization_id: OrganizationId },
}

impl HierarchyAnomaly {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Revisited { .. } => "revisited",
            Self::ParentMismatch { .. } => "parent_mismatch",
            Self::LookupFailed { .. } => "lookup_failed",
            Self::DepthLimitReached { .. } => "depth_limit",
        }
    }
}

/// Everything a breadth-first walk reached, plus what went wrong on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Traversal {
    pub organization_ids: BTreeSet<OrganizationId>,
    pub anomalies: Vec<HierarchyAnomaly>,
}

impl Traversal {
    /// True when the walk met no inconsistency.
    pub fn is_consistent(&self) -> bool {
        self.anomalies.is_empty()
    }

    pub fn contains(&self, organization_id: OrganizationId) -> bool {
        self.organization_ids.contains(&organization_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organization tree
// ═══════════════════════════════════════════════════════════════════════════════

/// Hierarchy queries over an injected children lookup.
#[derive(Debug, Clone)]
pub struct OrganizationTree<L> {
    lookup: L,
    max_depth: Option<usize>,
}

impl<L: ChildrenLookup> OrganizationTree<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            max_depth: None,
        }
    }

    /// Stop descending below `max_depth` levels under the root.
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Walk the subtree rooted at `root_id`.
    ///
    /// The root is always part of the result, even when its children cannot be
    /// loaded.
    pub fn traverse(&self, root_id: OrganizationId) -> Traversal {
        let mut traversal = Traversal::default();
        traversal.organization_ids.insert(root_id);

        let mut queue = VecDeque::from([(root_id, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            let children = match self.lookup.children_of(current) {
                Ok(children) => children,
                Err(e) => {
                    traversal.anomalies.push(HierarchyAnomaly::LookupFailed {
                        organization_id: current,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            // A leaf at the bound loses nothing; only report real cutoffs.
            if self.max_depth.is_some_and(|max| depth >= max) {
                if !children.is_empty() {
                    traversal
                        .anomalies
                        .push(HierarchyAnomaly::DepthLimitReached {
                            organization_id: current,
                        });
                }
                continue;
            }

            for child in children {
                if child.parent_id != Some(current) {
                    traversal.anomalies.push(HierarchyAnomaly::ParentMismatch {
                        organization_id: child.id,
                        listed_under: current,
                        parent_id: child.parent_id,
                    });
                    continue;
                }
                if !traversal.organization_ids.insert(child.id) {
                    traversal.anomalies.push(HierarchyAnomaly::Revisited {
                        organization_id: child.id,
                        via: current,
                    });
                    continue;
                }
                queue.push_back((child.id, depth + 1));
            }
        }

        for anomaly in &traversal.anomalies {
            warn!(
                root = %root_id,
                kind = anomaly.kind(),
                anomaly = ?anomaly,
                "Organization hierarchy inconsistency"
            );
            HierarchyAnomalyCounter::increment(anomaly.kind());
        }

        debug!(
            root = %root_id,
            reached = traversal.organization_ids.len(),
            "Organization subtree walked"
        );

        traversal
    }

    /// `root_id` together with every organization nested below it.
    pub fn accessible_organization_ids(
        &self,
        root_id: OrganizationId,
    ) -> BTreeSet<OrganizationId> {
        self.traverse(root_id).organization_ids
    }

    /// True iff `candidate_id` lies strictly below `ancestor_id`.
    ///
    /// An organization is not its own descendant; callers treat the same-org
    /// case separately.
    pub fn is_descendant_of(
        &self,
        candidate_id: OrganizationId,
        ancestor_id: OrganizationId,
    ) -> bool {
        candidate_id != ancestor_id && self.traverse(ancestor_id).contains(candidate_id)
    }
}

impl<L: ChildrenLookup + OrganizationLookup> OrganizationTree<L> {
    /// True iff making `proposed_parent_id` the parent of `node_id` would put
    /// `node_id` among its own ancestors.
    ///
    /// Also `true` when the proposed parent cannot be resolved, or when the
    /// subtree under `node_id` cannot be walked cleanly: the move cannot then
    /// be shown to be safe.
    pub fn would_create_cycle(
        &self,
        node_id: OrganizationId,
        proposed_parent_id: OrganizationId,
    ) -> bool {
        if node_id == proposed_parent_id {
            return true;
        }

        match self.lookup.find_organization(proposed_parent_id) {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(
                    node = %node_id,
                    proposed_parent = %proposed_parent_id,
                    "Blocking reparent: proposed parent does not exist"
                );
                return true;
            }
            Err(e) => {
                warn!(
                    node = %node_id,
                    proposed_parent = %proposed_parent_id,
                    error = %e,
                    "Blocking reparent: proposed parent lookup failed"
                );
                return true;
            }
        }

        let subtree = self.traverse(node_id);
        if subtree.contains(proposed_parent_id) {
            return true;
        }
        if !subtree.is_consistent() {
            warn!(
                node = %node_id,
                proposed_parent = %proposed_parent_id,
                "Blocking reparent: subtree is inconsistent"
            );
            return true;
        }
        false
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Children lookup backed by a plain list; parent links are taken as-is.
    struct Fixture {
        orgs: Vec<Organization>,
        failing: Vec<OrganizationId>,
    }

    impl Fixture {
        fn new(orgs: Vec<Organization>) -> Self {
            Self {
                orgs,
                failing: Vec::new(),
            }
        }
    }

    impl ChildrenLookup for Fixture {
        fn children_of(&self, id: OrganizationId) -> Result<Vec<Organization>, LookupError> {
            if self.failing.contains(&id) {
                return Err(LookupError::Unavailable("db down".into()));
            }
            Ok(self
                .orgs
                .iter()
                .filter(|o| o.parent_id == Some(id))
                .cloned()
                .collect())
        }
    }

    impl OrganizationLookup for Fixture {
        fn find_organization(
            &self,
            id: OrganizationId,
        ) -> Result<Option<Organization>, LookupError> {
            Ok(self.orgs.iter().find(|o| o.id == id).cloned())
        }
    }

    fn ids(raw: &[i64]) -> BTreeSet<OrganizationId> {
        raw.iter().copied().map(OrganizationId::new).collect()
    }

    fn org(id: i64) -> OrganizationId {
        OrganizationId::new(id)
    }

    fn chain() -> OrganizationTree<Fixture> {
        OrganizationTree::new(Fixture::new(vec![
            Organization::root(1, "root"),
            Organization::child(2, "mid", 1),
            Organization::child(3, "leaf", 2),
        ]))
    }

    #[test]
    fn test_chain_accessible_sets() {
        let tree = chain();
        assert_eq!(tree.accessible_organization_ids(org(1)), ids(&[1, 2, 3]));
        assert_eq!(tree.accessible_organization_ids(org(2)), ids(&[2, 3]));
        assert_eq!(tree.accessible_organization_ids(org(3)), ids(&[3]));
    }

    #[test]
    fn test_unknown_root_contains_itself() {
        let tree = chain();
        assert_eq!(tree.accessible_organization_ids(org(42)), ids(&[42]));
    }

    #[test]
    fn test_is_descendant_of() {
        let tree = chain();
        assert!(tree.is_descendant_of(org(3), org(1)));
        assert!(tree.is_descendant_of(org(2), org(1)));
        assert!(!tree.is_descendant_of(org(1), org(3)));
        assert!(!tree.is_descendant_of(org(1), org(1)));
    }

    #[test]
    fn test_would_create_cycle() {
        let tree = chain();
        assert!(tree.would_create_cycle(org(1), org(3)));
        assert!(tree.would_create_cycle(org(1), org(1)));
        assert!(tree.would_create_cycle(org(2), org(3)));
        assert!(!tree.would_create_cycle(org(3), org(1)));
        assert!(tree.would_create_cycle(org(3), org(99)));
    }

    #[test]
    fn test_cycle_in_data_terminates() {
        // 1 -> 2 -> 3 -> 1, with the back edge stored on org 1.
        let tree = OrganizationTree::new(Fixture::new(vec![
            Organization::child(1, "a", 3),
            Organization::child(2, "b", 1),
            Organization::child(3, "c", 2),
        ]));

        let traversal = tree.traverse(org(1));
        assert_eq!(traversal.organization_ids, ids(&[1, 2, 3]));
        assert_eq!(
            traversal.anomalies,
            vec![HierarchyAnomaly::Revisited {
                organization_id: org(1),
                via: org(3),
            }]
        );
    }

    #[test]
    fn test_lookup_failure_keeps_reached_nodes() {
        let mut fixture = Fixture::new(vec![
            Organization::root(1, "root"),
            Organization::child(2, "a", 1),
            Organization::child(3, "b", 2),
        ]);
        fixture.failing.push(org(2));
        let tree = OrganizationTree::new(fixture);

        let traversal = tree.traverse(org(1));
        assert_eq!(traversal.organization_ids, ids(&[1, 2]));
        assert!(!traversal.is_consistent());
        assert!(tree.would_create_cycle(org(1), org(7)));
    }

    #[test]
    fn test_parent_mismatch_is_not_followed() {
        struct Lying(HashMap<i64, Vec<Organization>>);
        impl ChildrenLookup for Lying {
            fn children_of(&self, id: OrganizationId) -> Result<Vec<Organization>, LookupError> {
                Ok(self.0.get(&id.get()).cloned().unwrap_or_default())
            }
        }

        let tree = OrganizationTree::new(Lying(HashMap::from([(
            1,
            vec![Organization::child(5, "elsewhere", 9)],
        )])));
        let traversal = tree.traverse(org(1));
        assert_eq!(traversal.organization_ids, ids(&[1]));
        assert_eq!(traversal.anomalies[0].kind(), "parent_mismatch");
    }

    #[test]
    fn test_depth_limit() {
        let tree = chain().with_max_depth(Some(1));
        let traversal = tree.traverse(org(1));
        assert_eq!(traversal.organization_ids, ids(&[1, 2]));
        assert_eq!(
            traversal.anomalies,
            vec![HierarchyAnomaly::DepthLimitReached {
                organization_id: org(2)
            }]
        );
        // The walk could not see below org 2, so the move is refused.
        assert!(tree.would_create_cycle(org(1), org(3)));
    }

    #[test]
    fn test_leaf_at_depth_limit_is_not_an_anomaly() {
        let tree = chain().with_max_depth(Some(1));
        let traversal = tree.traverse(org(2));
        assert_eq!(traversal.organization_ids, ids(&[2, 3]));
        assert!(traversal.is_consistent());
        assert!(!tree.would_create_cycle(org(2), org(1)));
    }
}
