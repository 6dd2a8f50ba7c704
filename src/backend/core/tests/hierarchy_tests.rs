//! Integration tests for organization hierarchy queries.

use std::collections::BTreeSet;
use std::sync::Arc;

use tasktree_core::rbac::{
    ChildrenLookup, DirectorySnapshot, HierarchyAnomaly, InMemoryDirectory, LookupError,
    Organization, OrganizationId, OrganizationLookup, OrganizationTree,
};

fn ids(values: &[i64]) -> BTreeSet<OrganizationId> {
    values.iter().copied().map(OrganizationId::new).collect()
}

fn directory(organizations: Vec<Organization>) -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::from_snapshot(DirectorySnapshot {
        organizations,
        members: Vec::new(),
    }))
}

/// 1 -> 2 -> 3
fn chain() -> OrganizationTree<Arc<InMemoryDirectory>> {
    OrganizationTree::new(directory(vec![
        Organization::root(1, "acme"),
        Organization::child(2, "acme-eu", 1),
        Organization::child(3, "acme-eu-fr", 2),
    ]))
}

#[test]
fn test_chain_accessible_sets() {
    let tree = chain();
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(1)), ids(&[1, 2, 3]));
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(2)), ids(&[2, 3]));
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(3)), ids(&[3]));
}

#[test]
fn test_root_always_included() {
    let tree = OrganizationTree::new(directory(Vec::new()));
    // Unknown to the directory, still part of its own subtree.
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(42)), ids(&[42]));
}

#[test]
fn test_wide_forest_keeps_trees_apart() {
    let tree = OrganizationTree::new(directory(vec![
        Organization::root(1, "acme"),
        Organization::child(2, "acme-eu", 1),
        Organization::child(3, "acme-us", 1),
        Organization::child(4, "acme-us-west", 3),
        Organization::root(10, "globex"),
        Organization::child(11, "globex-labs", 10),
    ]));
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(1)), ids(&[1, 2, 3, 4]));
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(10)), ids(&[10, 11]));
    assert!(!tree.is_descendant_of(OrganizationId::new(11), OrganizationId::new(1)));
}

#[test]
fn test_descendant_is_strict() {
    let tree = chain();
    assert!(tree.is_descendant_of(OrganizationId::new(3), OrganizationId::new(1)));
    assert!(tree.is_descendant_of(OrganizationId::new(2), OrganizationId::new(1)));
    assert!(!tree.is_descendant_of(OrganizationId::new(1), OrganizationId::new(1)));
    assert!(!tree.is_descendant_of(OrganizationId::new(1), OrganizationId::new(3)));
}

#[test]
fn test_cycle_checks_on_chain() {
    let tree = chain();
    assert!(tree.would_create_cycle(OrganizationId::new(1), OrganizationId::new(3)));
    assert!(tree.would_create_cycle(OrganizationId::new(1), OrganizationId::new(1)));
    assert!(tree.would_create_cycle(OrganizationId::new(2), OrganizationId::new(3)));
    assert!(!tree.would_create_cycle(OrganizationId::new(3), OrganizationId::new(1)));
}

#[test]
fn test_unknown_parent_blocks_reparent() {
    let tree = chain();
    assert!(tree.would_create_cycle(OrganizationId::new(3), OrganizationId::new(99)));
    assert!(tree.would_create_cycle(OrganizationId::new(1), OrganizationId::new(99)));
}

#[test]
fn test_reparent_onto_unrelated_tree_is_safe() {
    let tree = OrganizationTree::new(directory(vec![
        Organization::root(1, "acme"),
        Organization::child(2, "acme-eu", 1),
        Organization::root(10, "globex"),
    ]));
    assert!(!tree.would_create_cycle(OrganizationId::new(2), OrganizationId::new(10)));
    assert!(!tree.would_create_cycle(OrganizationId::new(10), OrganizationId::new(2)));
}

#[test]
fn test_stored_cycle_terminates_and_is_reported() {
    // 1 and 2 each name the other as parent.
    let tree = OrganizationTree::new(directory(vec![
        Organization::child(1, "a", 2),
        Organization::child(2, "b", 1),
    ]));
    let traversal = tree.traverse(OrganizationId::new(1));

    assert_eq!(traversal.organization_ids, ids(&[1, 2]));
    assert_eq!(
        traversal.anomalies,
        vec![HierarchyAnomaly::Revisited {
            organization_id: OrganizationId::new(1),
            via: OrganizationId::new(2),
        }]
    );
    assert!(tree.would_create_cycle(OrganizationId::new(1), OrganizationId::new(99)));
}

struct FlakyLookup {
    inner: Arc<InMemoryDirectory>,
    failing: OrganizationId,
}

impl ChildrenLookup for FlakyLookup {
    fn children_of(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Organization>, LookupError> {
        if organization_id == self.failing {
            return Err(LookupError::Unavailable("replica lag".to_string()));
        }
        self.inner.children_of(organization_id)
    }
}

impl OrganizationLookup for FlakyLookup {
    fn find_organization(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<Organization>, LookupError> {
        if organization_id == self.failing {
            return Err(LookupError::Unavailable("replica lag".to_string()));
        }
        self.inner.find_organization(organization_id)
    }
}

#[test]
fn test_lookup_failure_keeps_partial_result() {
    let tree = OrganizationTree::new(FlakyLookup {
        inner: directory(vec![
            Organization::root(1, "acme"),
            Organization::child(2, "acme-eu", 1),
            Organization::child(3, "acme-eu-fr", 2),
            Organization::child(4, "acme-us", 1),
        ]),
        failing: OrganizationId::new(2),
    });

    let traversal = tree.traverse(OrganizationId::new(1));
    assert_eq!(traversal.organization_ids, ids(&[1, 2, 4]));
    assert!(!traversal.is_consistent());
    assert_eq!(traversal.anomalies[0].kind(), "lookup_failed");

    // Nothing can be proven about 2's subtree, so moving it is refused.
    assert!(tree.would_create_cycle(OrganizationId::new(2), OrganizationId::new(4)));
}

#[test]
fn test_depth_bound_from_config() {
    let tree = chain().with_max_depth(Some(1));
    let traversal = tree.traverse(OrganizationId::new(1));
    assert_eq!(traversal.organization_ids, ids(&[1, 2]));
    assert_eq!(
        traversal.anomalies,
        vec![HierarchyAnomaly::DepthLimitReached {
            organization_id: OrganizationId::new(2),
        }]
    );
}

#[test]
fn test_leaves_at_depth_bound_are_not_cut_off() {
    let tree = chain().with_max_depth(Some(2));
    let traversal = tree.traverse(OrganizationId::new(1));
    assert_eq!(traversal.organization_ids, ids(&[1, 2, 3]));
    assert!(traversal.is_consistent());

    let shallow = chain().with_max_depth(Some(1));
    assert!(shallow.traverse(OrganizationId::new(2)).is_consistent());
    // Moving 2 back under its own parent stays legal at the bound.
    assert!(!shallow.would_create_cycle(OrganizationId::new(2), OrganizationId::new(1)));
}

#[test]
fn test_unresolvable_parent_blocks_reparent() {
    let tree = OrganizationTree::new(FlakyLookup {
        inner: directory(vec![
            Organization::root(1, "acme"),
            Organization::child(2, "acme-eu", 1),
            Organization::root(10, "globex"),
        ]),
        failing: OrganizationId::new(10),
    });
    assert!(tree.would_create_cycle(OrganizationId::new(2), OrganizationId::new(10)));
}

#[test]
fn test_tree_over_borrowed_directory() {
    let dir = InMemoryDirectory::new();
    dir.insert_organization(Organization::root(1, "acme"));
    dir.insert_organization(Organization::child(2, "acme-eu", 1));

    let tree = OrganizationTree::new(&dir);
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(1)), ids(&[1, 2]));

    dir.remove_organization(OrganizationId::new(2));
    assert_eq!(tree.accessible_organization_ids(OrganizationId::new(1)), ids(&[1]));
}
