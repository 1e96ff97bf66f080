//! Retainer listing: who keeps a node alive, with BFS distances.

use colored::Colorize;
use std::fmt::Write;

use heaptree_core::tree_node::annotation;
use heaptree_core::{EdgeClass, HeapSnapshot, NodeId, Result, SYSTEM_DISTANCE_BASE};

/// Renders `id` followed by one indented line per retaining edge.
pub fn render_retainers(snapshot: &HeapSnapshot, id: NodeId) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} distance {}",
        describe(snapshot, id)?.bold(),
        format!("retainers: {}", snapshot.retainer_count(id)?).dimmed(),
        format_distance(snapshot.distance(id)?)
    );
    for (source, edge) in snapshot.retainers(id)? {
        let label = match EdgeClass::from_kind(&edge.kind) {
            Some(EdgeClass::Property) => edge.name_or_index.cyan(),
            Some(EdgeClass::Context) => edge.name_or_index.yellow(),
            None => edge.name_or_index.normal(),
        };
        let _ = writeln!(
            out,
            "  {label} [{}] :: {} distance {}",
            edge.kind.as_str(),
            describe(snapshot, source)?,
            format_distance(snapshot.distance(source)?)
        );
    }
    Ok(out)
}

fn describe(snapshot: &HeapSnapshot, id: NodeId) -> Result<String> {
    let name = snapshot.node_name(id)?;
    let name = if name.is_empty() { "(unnamed)" } else { name };
    Ok(format!(
        "{name} {} {}",
        snapshot.address(id)?,
        annotation(snapshot.node_type(id)?, snapshot.self_size(id)?)
    ))
}

/// `-` when unreachable, `system+N` below a system root, else the depth.
pub fn format_distance(distance: Option<u32>) -> String {
    match distance {
        None => "-".to_string(),
        Some(d) if d >= SYSTEM_DISTANCE_BASE => format!("system+{}", d - SYSTEM_DISTANCE_BASE),
        Some(d) => d.to_string(),
    }
}
