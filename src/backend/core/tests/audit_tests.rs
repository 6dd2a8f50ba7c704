//! Integration tests for audit attribution and recording.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tasktree_core::config::AuditConfig;
use tasktree_core::rbac::{
    Actor, AttributionBasis, AuditContextResolver, AuditEntry, AuditEvent, AuditLogger, AuditSink,
    AuditTrail, DirectorySnapshot, InMemoryDirectory, Member, Organization, OrganizationId, Role,
    UserId,
};

fn directory() -> Arc<InMemoryDirectory> {
    Arc::new(InMemoryDirectory::from_snapshot(DirectorySnapshot {
        organizations: vec![
            Organization::root(1, "acme"),
            Organization::child(2, "acme-eu", 1),
            Organization::child(3, "acme-us", 1),
        ],
        members: vec![
            Member::new(7, "olive", Role::Owner, 1),
            Member::new(9, "adam", Role::Admin, 2),
            Member::new(11, "ada", Role::Admin, 3),
            Member::new(14, "alan", Role::Admin, 3),
            Member::new(20, "vera", Role::Viewer, 2),
        ],
    }))
}

fn resolver() -> AuditContextResolver<Arc<InMemoryDirectory>> {
    AuditContextResolver::new(directory(), &AuditConfig::default())
}

fn pair(user: i64, org: i64) -> (UserId, Option<OrganizationId>) {
    (UserId::new(user), Some(OrganizationId::new(org)))
}

#[derive(Default)]
struct MemorySink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditSink for MemorySink {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Attribution
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_owner_attributed_to_system_regardless_of_ids() {
    let resolver = resolver();
    let event = AuditEvent::new("organization.rename");
    for (id, org) in [(7, 1), (70, 5), (0, 0)] {
        let attribution = resolver.resolve(&Actor::new(id, Role::Owner, org), &event);
        assert_eq!(attribution.pair(), pair(0, 0));
        assert_eq!(attribution.basis, AttributionBasis::System);
    }
}

#[test]
fn test_system_identity_comes_from_config() {
    let config = AuditConfig {
        system_user_id: UserId::new(-1),
        system_organization_id: OrganizationId::new(-1),
        ..AuditConfig::default()
    };
    let resolver = AuditContextResolver::new(directory(), &config);
    let attribution = resolver.resolve(&Actor::new(7, Role::Owner, 1), &AuditEvent::new("x"));
    assert_eq!(attribution.pair(), pair(-1, -1));
}

#[test]
fn test_sole_admin_attributed_to_self() {
    let attribution =
        resolver().resolve(&Actor::new(9, Role::Admin, 2), &AuditEvent::new("task.create"));
    assert_eq!(attribution.pair(), pair(9, 2));
    assert_eq!(attribution.basis, AttributionBasis::OrganizationAdmin);
}

#[test]
fn test_admin_attributed_to_first_admin() {
    // 14 acts, 11 is the organization's first admin.
    let attribution =
        resolver().resolve(&Actor::new(14, Role::Admin, 3), &AuditEvent::new("task.create"));
    assert_eq!(attribution.pair(), pair(11, 3));
    assert_eq!(attribution.basis, AttributionBasis::OrganizationAdmin);
}

#[test]
fn test_admin_without_directory_entry_falls_back() {
    let dir = directory();
    dir.remove_member(UserId::new(9));
    let resolver = AuditContextResolver::new(dir, &AuditConfig::default());

    let attribution =
        resolver.resolve(&Actor::new(9, Role::Admin, 2), &AuditEvent::new("task.create"));
    assert_eq!(attribution.pair(), pair(9, 2));
    assert_eq!(attribution.basis, AttributionBasis::Fallback);
}

#[test]
fn test_viewer_attributed_to_self() {
    let attribution =
        resolver().resolve(&Actor::new(20, Role::Viewer, 2), &AuditEvent::new("task.read"));
    assert_eq!(attribution.pair(), pair(20, 2));
    assert_eq!(attribution.basis, AttributionBasis::Actor);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Recording
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_trail_writes_attributed_entry() {
    let sink = Arc::new(MemorySink::default());
    let trail = AuditTrail::new(resolver(), sink.clone());

    trail.record_action(
        &Actor::new(14, Role::Admin, 3),
        AuditEvent::new("member.invite")
            .with_target(31)
            .with_details(json!({ "email": "new@acme.test", "invite_token": "abc123" })),
    );

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.attributed_user_id, UserId::new(11));
    assert_eq!(entry.attributed_organization_id, Some(OrganizationId::new(3)));
    assert_eq!(entry.action, "member.invite");
    assert_eq!(entry.target_id.as_deref(), Some("31"));
    assert_eq!(entry.details["email"], "new@acme.test");
    assert_eq!(entry.details["invite_token"], "[REDACTED]");
}

#[test]
fn test_explicit_record_uses_given_attribution() {
    let sink = Arc::new(MemorySink::default());
    let trail = AuditTrail::new(resolver(), sink.clone());

    let attribution = trail
        .resolver()
        .resolve(&Actor::new(7, Role::Owner, 1), &AuditEvent::new("organization.delete"));
    trail.record(&attribution, AuditEvent::new("organization.delete").with_target(3));

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries[0].attributed_user_id, UserId::new(0));
    assert_eq!(entries[0].attributed_organization_id, Some(OrganizationId::new(0)));
}

#[tokio::test]
async fn test_full_channel_drops_without_blocking() {
    let (logger, mut receiver) = AuditLogger::channel(1);
    let trail = AuditTrail::new(resolver(), logger);
    let actor = Actor::new(20, Role::Viewer, 2);

    trail.record_action(&actor, AuditEvent::new("first"));
    trail.record_action(&actor, AuditEvent::new("second"));

    assert_eq!(receiver.recv().await.unwrap().action, "first");
    assert!(receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_channel_is_tolerated() {
    let (logger, receiver) = AuditLogger::channel(4);
    drop(receiver);
    let trail = AuditTrail::new(resolver(), logger);
    let attribution =
        trail.record_action(&Actor::new(9, Role::Admin, 2), AuditEvent::new("task.create"));
    assert_eq!(attribution.pair(), pair(9, 2));
}

#[tokio::test]
async fn test_spawned_logger_drains_until_senders_drop() {
    let (logger, handle) = AuditLogger::spawn(16);
    {
        let trail = AuditTrail::new(resolver(), logger);
        for i in 0..5 {
            trail.record_action(
                &Actor::new(9, Role::Admin, 2),
                AuditEvent::new("task.update").with_target(i),
            );
        }
    }
    handle.await.unwrap();
}
