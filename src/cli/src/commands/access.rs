//! Access decision and audit attribution commands.
//!
//! The actor is taken from the snapshot's member list when `--user` is known
//! there; `--role` and `--org` override or supply the missing fields.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tasktree_core::config::Config;
use tasktree_core::rbac::{
    AccessDecision, AccessRequest, Actor, AuditContextResolver, AuditEvent, AuditLogger,
    AuditTrail, Decision, InMemoryDirectory, OrganizationScope, Permission, Role,
};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ActorArgs {
    /// Acting user ID
    #[arg(short, long)]
    pub user: i64,

    /// Role override (owner, admin, viewer)
    #[arg(short, long)]
    pub role: Option<Role>,

    /// Home organization override
    #[arg(long)]
    pub org: Option<i64>,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub actor: ActorArgs,

    /// Target organization of the request
    #[arg(short, long, conflicts_with = "unscoped")]
    pub target: Option<i64>,

    /// Declare the request as not organization scoped
    #[arg(long)]
    pub unscoped: bool,

    /// Roles the route accepts (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub roles: Vec<Role>,

    /// Permissions the route requires (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    pub permissions: Vec<Permission>,
}

#[derive(Args)]
pub struct AttributeArgs {
    #[command(flatten)]
    pub actor: ActorArgs,

    /// Also record an audit entry for this action
    #[arg(short, long)]
    pub action: Option<String>,

    /// Target ID of the recorded action
    #[arg(long, requires = "action")]
    pub target_id: Option<String>,
}

fn resolve_actor(directory: &InMemoryDirectory, args: &ActorArgs) -> Actor {
    let mut actor = match directory.get_member(args.user.into()) {
        Some(member) => Actor::new(member.id, member.role, member.organization_id),
        None => Actor::unresolved(args.user),
    };
    if let Some(role) = args.role {
        actor = actor.with_role(role);
    }
    if let Some(org) = args.org {
        actor = actor.with_organization(org);
    }
    actor
}

#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    actor: &'a Actor,
    scope: OrganizationScope,
    #[serde(flatten)]
    decision: &'a Decision,
}

/// Evaluate a request and print the decision.
pub fn check(
    directory: &InMemoryDirectory,
    config: &Config,
    args: CheckArgs,
    format: OutputFormat,
) -> Result<()> {
    let actor = resolve_actor(directory, &args.actor);
    let scope = match (args.target, args.unscoped) {
        (Some(target), _) => OrganizationScope::Organization(target.into()),
        (None, true) => OrganizationScope::Unscoped,
        (None, false) => OrganizationScope::Undeclared,
    };

    let mut request = AccessRequest::new(actor.clone())
        .with_scope(scope)
        .require_permissions(args.permissions);
    if !args.roles.is_empty() {
        request = request.require_roles(args.roles);
    }

    let engine = AccessDecision::new(config.access.clone());
    let decision = engine.evaluate(&request);

    match format {
        OutputFormat::Table => match decision.reason() {
            None => output::print_success(&format!("allow (user {}, scope {:?})", actor.id, scope)),
            Some(reason) => output::print_denied(&format!("{} [{}]", reason, reason.code())),
        },
        _ => output::print_item(
            &CheckReport {
                actor: &actor,
                scope,
                decision: &decision,
            },
            format,
        )?,
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct AttributionReport<'a> {
    actor: &'a Actor,
    attributed_user_id: i64,
    attributed_organization_id: Option<i64>,
    basis: tasktree_core::rbac::AttributionBasis,
    recorded: bool,
}

/// Print the audit attribution for an actor, optionally recording an entry.
pub async fn attribute(
    directory: Arc<InMemoryDirectory>,
    config: &Config,
    args: AttributeArgs,
    format: OutputFormat,
) -> Result<()> {
    let actor = resolve_actor(&directory, &args.actor);
    let resolver = AuditContextResolver::new(directory, &config.audit);

    let (attribution, recorded) = match args.action {
        Some(action) => {
            let mut event = AuditEvent::new(action);
            if let Some(target_id) = args.target_id {
                event = event.with_target(target_id);
            }

            let (logger, handle) = AuditLogger::spawn(config.audit.channel_buffer_size);
            let trail = AuditTrail::new(resolver, logger);
            let attribution = trail.record_action(&actor, event);
            drop(trail);
            handle.await.context("Audit logger task failed")?;
            (attribution, true)
        }
        None => (resolver.resolve(&actor, &AuditEvent::new("cli.attribute")), false),
    };

    match format {
        OutputFormat::Table => {
            output::print_header("Audit attribution");
            output::print_detail("actor", &actor.id.to_string());
            output::print_detail("user", &attribution.user_id.to_string());
            output::print_detail(
                "organization",
                &attribution
                    .organization_id
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            );
            output::print_detail("basis", &format!("{:?}", attribution.basis));
            if recorded {
                output::print_success("Audit entry recorded");
            }
        }
        _ => output::print_item(
            &AttributionReport {
                actor: &actor,
                attributed_user_id: attribution.user_id.get(),
                attributed_organization_id: attribution.organization_id.map(|o| o.get()),
                basis: attribution.basis,
                recorded,
            },
            format,
        )?,
    }
    Ok(())
}
