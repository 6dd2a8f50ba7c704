//! Organization hierarchy commands.
//!
//! Provides tree, accessible, and cycle queries over a directory snapshot.

use std::collections::BTreeSet;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tasktree_core::rbac::{ChildrenLookup, InMemoryDirectory, OrganizationId, OrganizationTree};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct AccessibleArgs {
    /// Root organization ID
    pub organization: i64,
}

#[derive(Args)]
pub struct CycleArgs {
    /// Organization being moved
    pub node: i64,
    /// Proposed new parent
    pub parent: i64,
}

#[derive(Debug, Serialize, Tabled)]
struct TreeRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Organization")]
    name: String,
    #[tabled(rename = "Parent")]
    parent: String,
    #[tabled(rename = "Depth")]
    depth: usize,
}

#[derive(Debug, Serialize, Tabled)]
struct OrganizationRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
}

/// Print the whole forest, roots first, children indented.
pub fn tree(directory: &InMemoryDirectory, format: OutputFormat) -> Result<()> {
    let mut rows = Vec::new();
    let mut seen = BTreeSet::new();

    for root in directory.roots() {
        let mut stack = vec![(root, 0usize)];
        while let Some((organization, depth)) = stack.pop() {
            if !seen.insert(organization.id) {
                continue;
            }
            let indent = if depth == 0 {
                String::new()
            } else {
                format!("{}└─ ", "   ".repeat(depth - 1))
            };
            rows.push(TreeRow {
                id: organization.id.get(),
                name: format!("{}{}", indent, organization.name),
                parent: parent_label(organization.parent_id),
                depth,
            });

            let mut children = directory.children_of(organization.id)?;
            children.reverse();
            stack.extend(children.into_iter().map(|child| (child, depth + 1)));
        }
    }

    let orphaned = directory.organization_count() - seen.len();
    output::print_list(&rows, format)?;
    if orphaned > 0 {
        output::print_warning(&format!(
            "{} organization(s) are not reachable from any root (cyclic parent links)",
            orphaned
        ));
    }
    Ok(())
}

/// List the organization and everything nested below it.
pub fn accessible(
    tree: &OrganizationTree<&InMemoryDirectory>,
    args: AccessibleArgs,
    format: OutputFormat,
) -> Result<()> {
    let root = OrganizationId::new(args.organization);
    let traversal = tree.traverse(root);

    if format != OutputFormat::Table {
        return output::print_item(&traversal, format);
    }

    let rows: Vec<OrganizationRow> = traversal
        .organization_ids
        .iter()
        .map(|id| OrganizationRow {
            id: id.get(),
            name: tree
                .lookup()
                .get_organization(*id)
                .map(|o| o.name)
                .unwrap_or_else(|| "<unknown>".to_string()),
        })
        .collect();
    output::print_list(&rows, format)?;
    for anomaly in &traversal.anomalies {
        output::print_warning(&format!("{}: {:?}", anomaly.kind(), anomaly));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct CycleReport {
    node: i64,
    parent: i64,
    would_create_cycle: bool,
}

/// Report whether moving `node` under `parent` would close a cycle.
pub fn cycle(
    tree: &OrganizationTree<&InMemoryDirectory>,
    args: CycleArgs,
    format: OutputFormat,
) -> Result<()> {
    let would_create_cycle = tree.would_create_cycle(
        OrganizationId::new(args.node),
        OrganizationId::new(args.parent),
    );

    match format {
        OutputFormat::Table if would_create_cycle => output::print_denied(&format!(
            "Moving {} under {} is blocked (cycle, unknown parent, or inconsistent subtree)",
            args.node, args.parent
        )),
        OutputFormat::Table => output::print_success(&format!(
            "{} can be moved under {}",
            args.node, args.parent
        )),
        _ => output::print_item(
            &CycleReport {
                node: args.node,
                parent: args.parent,
                would_create_cycle,
            },
            format,
        )?,
    }
    Ok(())
}

fn parent_label(parent: Option<OrganizationId>) -> String {
    parent.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}
