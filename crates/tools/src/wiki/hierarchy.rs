//! Parent-pointer walks over the page tree.

use super::PAGES;
use crate::args::{self, opt_id};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

/// Ancestor page IDs of `page_id`, nearest first.
///
/// Stops at a root, at a dangling parent, or when a cycle in stored data repeats a page.
pub fn ancestors(store: &Store, page_id: &str) -> Result<Vec<String>, ToolError> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([page_id.to_string()]);
    let mut current = page_id.to_string();
    while let Some(parent) = store
        .get(PAGES, &current)?
        .and_then(|page| page.id_field("parent_page_id"))
        .filter(|p| !p.is_empty())
    {
        if !seen.insert(parent.clone()) {
            break;
        }
        chain.push(parent.clone());
        current = parent;
    }
    Ok(chain)
}

/// `true` when `candidate` lies below `page_id`, so making it the parent would close a cycle.
pub fn is_below(store: &Store, candidate: &str, page_id: &str) -> Result<bool, ToolError> {
    Ok(ancestors(store, candidate)?.iter().any(|a| a == page_id))
}

/// Direct children of `page_id`, in store order.
pub fn children(store: &Store, page_id: &str) -> Result<Vec<String>, ToolError> {
    Ok(store
        .records(PAGES)?
        .filter(|(_, page)| page.refers_to("parent_page_id", page_id))
        .map(|(id, _)| id.clone())
        .collect())
}

fn summary(store: &Store, page_id: &str) -> Result<Value, ToolError> {
    let page = lookup::record(store, PAGES, page_id, "Page")?;
    Ok(json!({
        "page_id": page_id,
        "title": page.get("title"),
        "status": page.get("status")
    }))
}

/// Subtree below `page_id` as nested `children` arrays, bounded by `depth`.
fn subtree(
    store: &Store,
    page_id: &str,
    depth: Option<usize>,
    include_deleted: bool,
    visited: &mut HashSet<String>,
) -> Result<Vec<Value>, ToolError> {
    if depth == Some(0) {
        return Ok(Vec::new());
    }
    let mut nodes = Vec::new();
    for child in children(store, page_id)? {
        if !visited.insert(child.clone()) {
            continue;
        }
        let mut node = summary(store, &child)?;
        if !include_deleted && node["status"] == "deleted" {
            continue;
        }
        node["children"] = json!(subtree(store, &child, depth.map(|d| d - 1), include_deleted, visited)?);
        nodes.push(node);
    }
    Ok(nodes)
}

fn count_nodes(nodes: &[Value]) -> usize {
    nodes
        .iter()
        .map(|n| 1 + n["children"].as_array().map_or(0, |c| count_nodes(c)))
        .sum()
}

#[derive(Deserialize)]
struct HierarchyArgs {
    #[serde(default, deserialize_with = "opt_id")]
    page_id: Option<String>,
    max_depth: Option<usize>,
    #[serde(default)]
    include_deleted: bool,
}

pub struct GetPageHierarchyTool;

impl Tool for GetPageHierarchyTool {
    fn name(&self) -> &str {
        "get_page_hierarchy"
    }

    fn description(&self) -> &str {
        "Show where a page sits in its space: the ancestor chain up to the root and the tree of descendants."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "max_depth": {"type": "integer", "minimum": 1, "description": "Levels of descendants to include."},
                "include_deleted": {"type": "boolean", "default": false}
            },
            "required": ["page_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGES])?;
        let args: HierarchyArgs = args::parse(args)?;
        let page_id = args::required_str("page_id", args.page_id)?;
        let page = lookup::record(store, PAGES, &page_id, "Page")?;
        let space_id = page.id_field("space_id");

        // Root first.
        let mut chain = ancestors(store, &page_id)?;
        chain.reverse();
        let ancestors = chain
            .iter()
            .filter(|id| store.contains(PAGES, id).unwrap_or(false))
            .map(|id| summary(store, id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut visited = HashSet::from([page_id.clone()]);
        let descendants = subtree(store, &page_id, args.max_depth, args.include_deleted, &mut visited)?;

        Ok(json!({
            "success": true,
            "page": summary(store, &page_id)?,
            "space_id": space_id,
            "depth": ancestors.len(),
            "ancestors": ancestors,
            "descendant_count": count_nodes(&descendants),
            "descendants": descendants
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::fixtures;

    #[test]
    fn ancestors_walk_to_root() {
        let store = fixtures::store();
        assert_eq!(ancestors(&store, "3").expect("walk"), vec!["2", "1"]);
        assert!(ancestors(&store, "1").expect("walk").is_empty());
        assert!(is_below(&store, "3", "1").expect("walk"));
        assert!(!is_below(&store, "1", "3").expect("walk"));
    }

    #[test]
    fn ancestors_survive_cycles_in_data() {
        let mut store = fixtures::store();
        if let Some(home) = store.get_mut(PAGES, "1").expect("table") {
            home.insert("parent_page_id".into(), json!("3"));
        }
        assert_eq!(ancestors(&store, "3").expect("walk"), vec!["2", "1"]);
    }

    #[test]
    fn hierarchy_reports_both_directions() {
        let mut store = fixtures::store();
        let out = GetPageHierarchyTool.invoke(&mut store, json!({"page_id": "2"})).expect("tree");
        assert_eq!(out["depth"], 1);
        assert_eq!(out["ancestors"][0]["title"], "Home");
        assert_eq!(out["descendants"][0]["page_id"], "3");

        let out = GetPageHierarchyTool
            .invoke(&mut store, json!({"page_id": 1, "max_depth": 1}))
            .expect("tree");
        assert_eq!(out["descendant_count"], 2);
        assert_eq!(out["descendants"][0]["children"], json!([]));
    }

    #[test]
    fn deleted_descendants_are_hidden_by_default() {
        let mut store = fixtures::store();
        if let Some(page) = store.get_mut(PAGES, "3").expect("table") {
            page.insert("status".into(), json!("deleted"));
        }
        let out = GetPageHierarchyTool.invoke(&mut store, json!({"page_id": "1"})).expect("tree");
        assert_eq!(out["descendant_count"], 2);
        let out = GetPageHierarchyTool
            .invoke(&mut store, json!({"page_id": "1", "include_deleted": true}))
            .expect("tree");
        assert_eq!(out["descendant_count"], 3);
    }
}
