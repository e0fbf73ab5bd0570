//! Page version snapshots and their captured components.

use super::{PAGES, PAGE_VERSIONS, PAGE_VERSION_COMPONENTS, SMART_LINKS, USERS, WHITEBOARDS};
use crate::args::{self, opt_id};
use crate::validate::{contains_ci, prefix_match};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Next version number for a page: highest existing plus one.
fn next_version_number(store: &Store, page_id: &str) -> Result<u64, ToolError> {
    let latest = store
        .records(PAGE_VERSIONS)?
        .filter(|(_, v)| v.refers_to("page_id", page_id))
        .filter_map(|(_, v)| v.get("version_number").and_then(Value::as_u64))
        .max();
    Ok(latest.map_or(1, |n| n + 1))
}

/// Whiteboard content is stored as JSON text; unparseable text captures as an empty list.
fn whiteboard_content(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(text)) => serde_json::from_str(text).unwrap_or_else(|_| json!([])),
        Some(other) => other.clone(),
        None => json!([]),
    }
}

/// Snapshots of the whiteboards and smart links hosted on `page_id`.
fn capture_components(store: &Store, page_id: &str) -> Result<Vec<(&'static str, Value)>, ToolError> {
    let mut captured = Vec::new();
    for (id, board) in store.records(WHITEBOARDS)? {
        if board.refers_to("host_page_id", page_id) {
            captured.push((
                "whiteboard",
                json!({
                    "whiteboard_id": id,
                    "content": whiteboard_content(board.get("content")),
                    "version": board.str_or("status", "current")
                }),
            ));
        }
    }
    for (id, link) in store.records(SMART_LINKS)? {
        if link.refers_to("host_page_id", page_id) {
            captured.push((
                "smart_link",
                json!({
                    "smart_link_id": id,
                    "title": link.str_or("title", ""),
                    "url": link.str_or("url", "")
                }),
            ));
        }
    }
    Ok(captured)
}

#[derive(Deserialize)]
struct MakeVersionArgs {
    #[serde(default, deserialize_with = "opt_id")]
    page_id: Option<String>,
    title: Option<String>,
    body_storage: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    created_by: Option<String>,
}

pub struct MakePageVersionTool;

impl Tool for MakePageVersionTool {
    fn name(&self) -> &str {
        "make_page_version"
    }

    fn description(&self) -> &str {
        "Snapshot a current page as its next version. Title and body default to the page's own; \
         whiteboards and smart links hosted on the page are captured as version components."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "title": {"type": "string", "description": "Overrides the page title in the snapshot."},
                "body_storage": {"type": "string"},
                "created_by": {"type": "string"}
            },
            "required": ["page_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGES, PAGE_VERSIONS, PAGE_VERSION_COMPONENTS, WHITEBOARDS, SMART_LINKS])?;
        let args: MakeVersionArgs = args::parse(args)?;
        let page_id = args::required_str("page_id", args.page_id)?;
        let page = lookup::record(store, PAGES, &page_id, "Page")?;
        if !page.is("status", "current") {
            return Err(ToolError::Rejected(format!(
                "Page with ID '{page_id}' has status '{}'. Only pages with status 'current' can have versions created.",
                page.str_or("status", "")
            )));
        }
        if let Some(user_id) = args.created_by.as_deref() {
            lookup::ensure(store, USERS, user_id, "User")?;
        }

        let title = args
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| page.str_or("title", "").to_string());
        let body = args
            .body_storage
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| page.str_or("body_storage", "").to_string());
        let version_number = next_version_number(store, &page_id)?;
        let version_id = next_numeric_id(store.table(PAGE_VERSIONS)?);
        let mut version = json!({
            "page_version_id": version_id,
            "page_id": page_id,
            "version_number": version_number,
            "title": title,
            "body_storage": body,
            "created_at": store.now()
        });
        if let Some(user_id) = args.created_by {
            version["created_by"] = json!(user_id);
        }
        let captured = capture_components(store, &page_id)?;
        store.insert(PAGE_VERSIONS, &version_id, version.as_object().cloned().unwrap_or_default())?;

        let mut components = Vec::with_capacity(captured.len());
        for (component_type, data) in captured {
            let component_id = next_numeric_id(store.table(PAGE_VERSION_COMPONENTS)?);
            let component = json!({
                "component_id": component_id,
                "page_version_id": version_id,
                "component_type": component_type,
                "component_data": data
            });
            store.insert(
                PAGE_VERSION_COMPONENTS,
                &component_id,
                component.as_object().cloned().unwrap_or_default(),
            )?;
            components.push(component);
        }
        info!(
            page_id = %page_id,
            version_number,
            components = components.len(),
            "Page version created"
        );
        Ok(json!({"success": true, "page_version": version, "components": components}))
    }
}

#[derive(Deserialize)]
struct FetchVersionsArgs {
    #[serde(default, deserialize_with = "opt_id")]
    page_version_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    page_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    version_number: Option<String>,
    title: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    created_by: Option<String>,
    created_at: Option<String>,
}

pub struct FetchVersionsTool;

impl Tool for FetchVersionsTool {
    fn name(&self) -> &str {
        "fetch_versions"
    }

    fn description(&self) -> &str {
        "List page versions, optionally filtered by version, page, version number, title, author \
         or creation date prefix."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_version_id": {"type": "string"},
                "page_id": {"type": "string"},
                "version_number": {"type": "string", "description": "Positive integer."},
                "title": {"type": "string"},
                "created_by": {"type": "string"},
                "created_at": {"type": "string"}
            },
            "required": []
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGE_VERSIONS])?;
        let args: FetchVersionsArgs = args::parse(args)?;
        let version_number = match args.version_number.as_deref() {
            None => None,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(n) if n >= 1 => Some(n),
                Ok(_) => {
                    return Err(ToolError::InvalidArgs(format!(
                        "Invalid version_number: must be a positive integer, got {raw}"
                    )))
                }
                Err(_) => {
                    return Err(ToolError::InvalidArgs(format!(
                        "Invalid version_number: cannot convert '{raw}' to integer"
                    )))
                }
            },
        };
        let title = args.title.as_deref().map(contains_ci).transpose()?;

        let versions: Vec<Value> = store
            .records(PAGE_VERSIONS)?
            .map(|(_, v)| v)
            .filter(|v| {
                args.page_version_id.as_deref().map_or(true, |id| v.refers_to("page_version_id", id))
                    && args.page_id.as_deref().map_or(true, |id| v.refers_to("page_id", id))
                    && args.created_by.as_deref().map_or(true, |u| v.refers_to("created_by", u))
                    && version_number.map_or(true, |n| v.get("version_number").and_then(Value::as_i64) == Some(n))
                    && title.as_ref().map_or(true, |re| v.str_field("title").is_some_and(|t| re.is_match(t)))
                    && args.created_at.as_deref().map_or(true, |p| prefix_match(v.str_field("created_at"), p))
            })
            .map(|v| Value::Object(v.clone()))
            .collect();
        Ok(json!({"success": true, "count": versions.len(), "page_versions": versions}))
    }
}

#[derive(Deserialize)]
struct DeleteVersionArgs {
    #[serde(default, deserialize_with = "opt_id")]
    page_id: Option<String>,
}

pub struct DeletePageVersionTool;

impl Tool for DeletePageVersionTool {
    fn name(&self) -> &str {
        "delete_page_version"
    }

    fn description(&self) -> &str {
        "Permanently delete every version of a page together with the components captured in them. \
         Used after a hard page delete."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"page_id": {"type": "string"}},
            "required": ["page_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGE_VERSIONS, PAGE_VERSION_COMPONENTS])?;
        let args: DeleteVersionArgs = args::parse(args)?;
        let page_id = args
            .page_id
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("page_id cannot be empty".into()))?;

        let doomed: Vec<(String, Value)> = store
            .records(PAGE_VERSIONS)?
            .filter(|(_, v)| v.refers_to("page_id", &page_id))
            .map(|(id, v)| (id.clone(), v.get("version_number").cloned().unwrap_or(Value::Null)))
            .collect();
        if doomed.is_empty() {
            warn!(page_id = %page_id, "No versions to delete");
            return Err(ToolError::NotFound(format!("No page versions found for page ID '{page_id}'")));
        }
        let component_ids: Vec<String> = store
            .records(PAGE_VERSION_COMPONENTS)?
            .filter(|(_, c)| {
                c.id_field("page_version_id")
                    .is_some_and(|vid| doomed.iter().any(|(id, _)| *id == vid))
            })
            .map(|(id, _)| id.clone())
            .collect();

        for (version_id, _) in &doomed {
            store.remove(PAGE_VERSIONS, version_id)?;
        }
        for component_id in &component_ids {
            store.remove(PAGE_VERSION_COMPONENTS, component_id)?;
        }
        info!(
            page_id = %page_id,
            versions = doomed.len(),
            components = component_ids.len(),
            "Page versions deleted"
        );
        Ok(json!({
            "success": true,
            "message": format!("Deleted {} version(s) for page '{page_id}'", doomed.len()),
            "deleted_count": doomed.len(),
            "deleted_components": component_ids.len(),
            "deleted_versions": doomed
                .iter()
                .map(|(id, number)| json!({"page_version_id": id, "version_number": number}))
                .collect::<Vec<_>>()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::fixtures;

    #[test]
    fn version_captures_whiteboards_and_links() {
        let mut store = fixtures::store();
        let out = MakePageVersionTool
            .invoke(&mut store, json!({"page_id": "3", "created_by": 2}))
            .expect("version");
        assert_eq!(out["page_version"]["page_version_id"], "2");
        assert_eq!(out["page_version"]["version_number"], 1);
        assert_eq!(out["page_version"]["title"], "Database Failover");
        assert_eq!(out["page_version"]["created_by"], "2");

        let components = out["components"].as_array().expect("components");
        assert_eq!(components.len(), 2);
        assert_eq!(components[0]["component_type"], "whiteboard");
        assert_eq!(components[0]["component_data"]["content"][0]["shape"], "box");
        assert_eq!(components[1]["component_type"], "smart_link");
        assert_eq!(components[1]["component_id"], "2");
    }

    #[test]
    fn version_numbers_increase_per_page() {
        let mut store = fixtures::store();
        let out = MakePageVersionTool
            .invoke(&mut store, json!({"page_id": "2", "title": "Runbooks v2"}))
            .expect("version");
        assert_eq!(out["page_version"]["version_number"], 2);
        assert_eq!(out["page_version"]["title"], "Runbooks v2");
        assert_eq!(out["components"], json!([]));
    }

    #[test]
    fn only_current_pages_get_versions() {
        let mut store = fixtures::store();
        let err = MakePageVersionTool.invoke(&mut store, json!({"page_id": "5"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Page with ID '5' has status 'locked'. Only pages with status 'current' can have versions created."
        );
    }

    #[test]
    fn fetch_versions_validates_number() {
        let mut store = fixtures::store();
        let out = FetchVersionsTool
            .invoke(&mut store, json!({"page_id": 2, "version_number": "1"}))
            .expect("versions");
        assert_eq!(out["count"], 1);

        let err = FetchVersionsTool.invoke(&mut store, json!({"version_number": 0})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid version_number: must be a positive integer, got 0");
        let err = FetchVersionsTool.invoke(&mut store, json!({"version_number": "one"})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid version_number: cannot convert 'one' to integer");
    }

    #[test]
    fn delete_removes_versions_and_components() {
        let mut store = fixtures::store();
        MakePageVersionTool.invoke(&mut store, json!({"page_id": "3"})).expect("v1");
        MakePageVersionTool.invoke(&mut store, json!({"page_id": "3"})).expect("v2");

        let out = DeletePageVersionTool.invoke(&mut store, json!({"page_id": "3"})).expect("deleted");
        assert_eq!(out["deleted_count"], 2);
        assert_eq!(out["deleted_components"], 4);
        assert_eq!(store.records(PAGE_VERSION_COMPONENTS).expect("table").count(), 0);
        assert!(store.contains(PAGE_VERSIONS, "1").expect("table"));

        let err = DeletePageVersionTool.invoke(&mut store, json!({"page_id": "3"})).unwrap_err();
        assert_eq!(err.to_string(), "No page versions found for page ID '3'");
    }
}
