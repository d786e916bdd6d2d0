use anyhow::Result;
use clap::Args;
use promote_core::config::Settings;
use promote_core::graph::Registry;
use promote_core::model::{WorkItemId, WorkItemNode};
use promote_core::pipeline::{SyncOptions, fetch_registry};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::output::{OutputMode, pretty_rule};

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Read the hierarchy from a snapshot file instead of Azure DevOps.
    #[arg(long, value_name = "PATH")]
    pub from_snapshot: Option<PathBuf>,
}

/// One hierarchy line: `Type id. title`, indented two spaces per level.
pub fn tree_line(node: &WorkItemNode, depth: usize) -> String {
    format!(
        "{:indent$}{} {}. {}",
        "",
        node.work_item_type,
        node.id,
        node.title,
        indent = depth * 2
    )
}

/// Depth-first walk from every root, children in discovery order.
fn write_tree(w: &mut dyn Write, registry: &Registry, with_state: bool) -> io::Result<()> {
    let mut stack: Vec<(WorkItemId, usize)> = registry.roots().map(|n| (n.id, 0)).collect();
    stack.reverse();
    while let Some((id, depth)) = stack.pop() {
        let Some(node) = registry.get(id) else {
            continue;
        };
        if with_state && !node.state.is_empty() {
            writeln!(w, "{} [{}]", tree_line(node, depth), node.state)?;
        } else {
            writeln!(w, "{}", tree_line(node, depth))?;
        }
        let mut children: Vec<(WorkItemId, usize)> =
            registry.children(id).map(|child| (child.id, depth + 1)).collect();
        children.reverse();
        stack.extend(children);
    }
    Ok(())
}

/// Print `registry` in the requested mode. JSON emits the flat node list.
pub fn print_registry(registry: &Registry, output: OutputMode) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match output {
        OutputMode::Json => {
            let nodes: Vec<&WorkItemNode> = registry.iter().collect();
            serde_json::to_writer_pretty(&mut out, &nodes)?;
            writeln!(out)?;
        }
        OutputMode::Text => write_tree(&mut out, registry, false)?,
        OutputMode::Pretty => {
            write_tree(&mut out, registry, true)?;
            pretty_rule(&mut out)?;
            writeln!(out, "{} work items, {} roots", registry.len(), registry.roots().count())?;
        }
    }
    Ok(())
}

/// Execute `promote tree`: materialize the hierarchy and print it.
///
/// # Errors
///
/// Returns an error if settings are incomplete, the hierarchy query fails,
/// or the snapshot cannot be loaded.
pub fn run_tree(args: &TreeArgs, settings: &Settings, output: OutputMode) -> Result<()> {
    let registry = match &args.from_snapshot {
        Some(path) => super::load_registry(path)?,
        None => {
            let client = super::connect(settings)?;
            let options = SyncOptions::from_settings(settings);
            let fetched = fetch_registry(&client, &options, |_, _| {})?;
            tracing::info!(
                nodes = fetched.build.registry.len(),
                requests = client.request_count(),
                "hierarchy materialized"
            );
            fetched.build.registry
        }
    };
    print_registry(&registry, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promote_core::model::WorkItemType;

    fn sample() -> Registry {
        Registry::from_nodes(vec![
            WorkItemNode::new(1, WorkItemType::Epic, "E1"),
            WorkItemNode {
                parent_id: Some(WorkItemId(1)),
                ..WorkItemNode::new(10, WorkItemType::UserStory, "S1").with_state("Active")
            },
            WorkItemNode {
                parent_id: Some(WorkItemId(10)),
                ..WorkItemNode::new(100, WorkItemType::Task, "T1")
            },
            WorkItemNode::new(2, WorkItemType::Epic, "E2"),
        ])
        .unwrap()
    }

    #[test]
    fn text_tree_is_depth_first_and_indented() {
        let mut buf = Vec::new();
        write_tree(&mut buf, &sample(), false).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Epic 1. E1\n  User Story 10. S1\n    Task 100. T1\nEpic 2. E2\n"
        );
    }

    #[test]
    fn pretty_tree_shows_state() {
        let mut buf = Vec::new();
        write_tree(&mut buf, &sample(), true).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("  User Story 10. S1 [Active]\n"));
    }
}
