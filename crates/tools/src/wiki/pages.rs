//! Page lifecycle and page/space search.

use super::hierarchy::is_below;
use super::{PAGES, SPACES, USERS};
use crate::args::{self, opt_id};
use crate::validate::{contains_ci, one_of, opt_one_of, prefix_match};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const CREATE_STATUSES: &[&str] = &["current", "draft", "archived"];
const EDIT_STATUSES: &[&str] = &["current", "draft", "archived", "locked"];
const PAGE_STATUSES: &[&str] = &["current", "draft", "locked", "archived", "deleted"];
const SPACE_TYPES: &[&str] = &["global", "personal"];
const SPACE_STATUSES: &[&str] = &["current", "archived"];

/// Placement of a page: its space and optional parent.
struct Location<'a> {
    space_id: &'a str,
    parent_id: Option<&'a str>,
}

impl Location<'_> {
    fn describe(&self) -> String {
        match self.parent_id {
            Some(parent) => format!("space '{}' under parent '{parent}'", self.space_id),
            None => format!("root level of space '{}'", self.space_id),
        }
    }

    fn holds(&self, page: &Record) -> bool {
        let parent = page.id_field("parent_page_id").filter(|p| !p.is_empty());
        page.refers_to("space_id", self.space_id) && parent.as_deref() == self.parent_id
    }
}

/// Titles are unique among live siblings, ignoring case.
fn ensure_unique_title(
    store: &Store,
    location: &Location<'_>,
    title: &str,
    except: Option<&str>,
) -> Result<(), ToolError> {
    let wanted = title.to_lowercase();
    let clash = store.records(PAGES)?.any(|(id, page)| {
        Some(id.as_str()) != except
            && !page.is("status", "deleted")
            && location.holds(page)
            && page.str_or("title", "").to_lowercase() == wanted
    });
    if clash {
        return Err(ToolError::Conflict(format!(
            "Duplicate title: A page with title '{title}' already exists in {}. \
             Page titles must be unique among siblings.",
            location.describe()
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct EstablishPageArgs {
    #[serde(default, deserialize_with = "opt_id")]
    space_id: Option<String>,
    title: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    created_by: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    parent_page_id: Option<String>,
    body_storage: Option<String>,
    status: Option<String>,
}

pub struct EstablishPageTool;

impl Tool for EstablishPageTool {
    fn name(&self) -> &str {
        "establish_page"
    }

    fn description(&self) -> &str {
        "Create a page in a space, optionally under a parent page of the same space. \
         New pages start as current, draft or archived; never deleted or locked."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "space_id": {"type": "string"},
                "title": {"type": "string"},
                "created_by": {"type": "string", "description": "User ID of the author."},
                "parent_page_id": {"type": "string"},
                "body_storage": {"type": "string"},
                "status": {"type": "string", "enum": CREATE_STATUSES, "default": "current"}
            },
            "required": ["space_id", "title", "created_by"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGES, SPACES, USERS])?;
        let args: EstablishPageArgs = args::parse(args)?;
        let space_id = args::required_str("space_id", args.space_id)?;
        let title = args
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("title is required and cannot be empty".into()))?;
        let created_by = args::required_str("created_by", args.created_by)?;

        lookup::ensure(store, SPACES, &space_id, "Space")?;
        lookup::ensure(store, USERS, &created_by, "User")?;
        if let Some(status) = args.status.as_deref() {
            if matches!(status, "deleted" | "locked") {
                return Err(ToolError::InvalidArgs(format!(
                    "Invalid status value: '{status}'. Pages cannot be created with 'deleted' or 'locked' status."
                )));
            }
            one_of("status", status, CREATE_STATUSES)?;
        }
        let parent_id = args.parent_page_id.filter(|p| !p.is_empty());
        if let Some(parent_id) = parent_id.as_deref() {
            let parent = lookup::record(store, PAGES, parent_id, "Parent page")?;
            if !parent.refers_to("space_id", &space_id) {
                return Err(ToolError::Rejected(format!(
                    "Parent page '{parent_id}' is in space '{}', but new page is in space '{space_id}'. \
                     Parent and child must be in the same space.",
                    parent.id_field("space_id").unwrap_or_default()
                )));
            }
        }
        let location = Location { space_id: &space_id, parent_id: parent_id.as_deref() };
        ensure_unique_title(store, &location, &title, None)?;

        let page_id = next_numeric_id(store.table(PAGES)?);
        let now = store.now();
        let page = json!({
            "page_id": page_id,
            "title": title,
            "space_id": space_id,
            "parent_page_id": parent_id,
            "body_storage": args.body_storage.unwrap_or_default(),
            "status": args.status.as_deref().unwrap_or("current"),
            "created_by": created_by,
            "created_at": now,
            "updated_by": created_by,
            "updated_at": now
        });
        store.insert(PAGES, &page_id, page.as_object().cloned().unwrap_or_default())?;
        info!(page_id = %page_id, space_id = %space_id, "Page created");
        Ok(json!({"success": true, "page": page}))
    }
}

#[derive(Deserialize)]
struct EditPageArgs {
    #[serde(default, deserialize_with = "opt_id")]
    page_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    updated_by: Option<String>,
    title: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    space_id: Option<String>,
    /// Empty string moves the page to the root of its space.
    #[serde(default, deserialize_with = "opt_id")]
    parent_page_id: Option<String>,
    body_storage: Option<String>,
    status: Option<String>,
}

pub struct EditPageTool;

impl EditPageTool {
    fn check_parent(store: &Store, page_id: &str, parent_id: &str, space_id: &str) -> Result<(), ToolError> {
        let parent = store.get(PAGES, parent_id)?.ok_or_else(|| {
            ToolError::NotFound(format!("Parent page not found: parent_page_id '{parent_id}' does not exist"))
        })?;
        if parent.is("status", "deleted") {
            return Err(ToolError::Rejected(format!(
                "Cannot set deleted page as parent: parent_page_id '{parent_id}'"
            )));
        }
        if parent_id == page_id {
            return Err(ToolError::Rejected("Cannot set a page as its own parent".into()));
        }
        if is_below(store, parent_id, page_id)? {
            return Err(ToolError::Rejected("Cannot create circular parent relationship".into()));
        }
        if !parent.refers_to("space_id", space_id) {
            return Err(ToolError::Rejected(format!(
                "Parent page '{parent_id}' is in space '{}', but page is in space '{space_id}'. \
                 Parent and child must be in the same space.",
                parent.id_field("space_id").unwrap_or_default()
            )));
        }
        Ok(())
    }
}

impl Tool for EditPageTool {
    fn name(&self) -> &str {
        "edit_page"
    }

    fn description(&self) -> &str {
        "Update a page's title, body, status, space or parent. Moves are checked for cycles \
         and for sibling title clashes; updated_by and updated_at are stamped on every edit."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "updated_by": {"type": "string"},
                "title": {"type": "string"},
                "space_id": {"type": "string", "description": "Target space; must not be archived."},
                "parent_page_id": {"type": "string", "description": "New parent, or \"\" to make the page a root page."},
                "body_storage": {"type": "string"},
                "status": {"type": "string", "enum": EDIT_STATUSES}
            },
            "required": ["page_id", "updated_by"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGES, USERS, SPACES])?;
        let args: EditPageArgs = args::parse(args)?;
        let page_id = args
            .page_id
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("Missing required parameter: page_id".into()))?;
        let updated_by = args
            .updated_by
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("Missing required parameter: updated_by".into()))?;

        let page = store
            .get(PAGES, &page_id)?
            .ok_or_else(|| ToolError::NotFound(format!("Page not found: page_id '{page_id}' does not exist")))?;
        if page.is("status", "deleted") {
            return Err(ToolError::Rejected(format!("Cannot update deleted page: page_id '{page_id}'")));
        }
        if !store.contains(USERS, &updated_by)? {
            return Err(ToolError::NotFound(format!(
                "User not found: updated_by '{updated_by}' does not exist"
            )));
        }
        opt_one_of("status", args.status.as_deref(), EDIT_STATUSES)?;
        if args.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ToolError::InvalidArgs("title cannot be empty".into()));
        }
        if let Some(space_id) = args.space_id.as_deref() {
            let space = store
                .get(SPACES, space_id)?
                .ok_or_else(|| ToolError::NotFound(format!("Space not found: space_id '{space_id}' does not exist")))?;
            if space.is("status", "archived") {
                return Err(ToolError::Rejected(format!(
                    "Cannot move page to archived space: space_id '{space_id}'"
                )));
            }
        }

        let current_space = page.id_field("space_id").unwrap_or_default();
        let current_parent = page.id_field("parent_page_id").filter(|p| !p.is_empty());
        let final_space = args.space_id.clone().unwrap_or_else(|| current_space.clone());
        let final_parent = match args.parent_page_id.as_deref() {
            Some("") => None,
            Some(parent) => Some(parent.to_string()),
            None => current_parent.clone(),
        };
        let space_changed = final_space != current_space;
        if args.parent_page_id.is_some() || space_changed {
            if let Some(parent_id) = final_parent.as_deref() {
                Self::check_parent(store, &page_id, parent_id, &final_space)?;
            }
        }
        if space_changed {
            let live_children = store
                .records(PAGES)?
                .filter(|(_, child)| child.refers_to("parent_page_id", &page_id) && !child.is("status", "deleted"))
                .count();
            if live_children > 0 {
                return Err(ToolError::Rejected(format!(
                    "Cannot move page '{page_id}' to another space: page has child pages. \
                     Move or reassign children first."
                )));
            }
        }

        let final_title = args.title.clone().unwrap_or_else(|| page.str_or("title", "").to_string());
        let moved = space_changed || final_parent != current_parent;
        let renamed = args.title.as_deref().is_some_and(|t| Some(t) != page.str_field("title"));
        if moved || renamed {
            let location = Location { space_id: &final_space, parent_id: final_parent.as_deref() };
            ensure_unique_title(store, &location, &final_title, Some(page_id.as_str()))?;
        }

        let now = store.now();
        let page = lookup::record_mut(store, PAGES, &page_id, "Page")?;
        if let Some(title) = args.title {
            page.insert("title".into(), json!(title));
        }
        if args.space_id.is_some() {
            page.insert("space_id".into(), json!(final_space));
        }
        if args.parent_page_id.is_some() {
            page.insert("parent_page_id".into(), json!(final_parent));
        }
        if let Some(body) = args.body_storage {
            page.insert("body_storage".into(), json!(body));
        }
        if let Some(status) = args.status {
            page.insert("status".into(), json!(status));
        }
        page.insert("updated_by".into(), json!(updated_by));
        page.insert("updated_at".into(), json!(now));
        info!(page_id = %page_id, moved, "Page updated");
        Ok(json!({"success": true, "page": page.clone()}))
    }
}

#[derive(Deserialize)]
struct RemovePageArgs {
    #[serde(default, deserialize_with = "opt_id")]
    page_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    deleted_by: Option<String>,
    #[serde(default)]
    hard_delete: bool,
}

pub struct RemovePageTool;

impl Tool for RemovePageTool {
    fn name(&self) -> &str {
        "remove_page"
    }

    fn description(&self) -> &str {
        "Delete a page. Soft delete (default) marks it deleted; hard delete removes the record. \
         Locked and archived pages, and pages that still have children, cannot be deleted."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "deleted_by": {"type": "string"},
                "hard_delete": {"type": "boolean", "default": false}
            },
            "required": ["page_id", "deleted_by"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGES, USERS])?;
        let args: RemovePageArgs = args::parse(args)?;
        let page_id = args::required_str("page_id", args.page_id)?;
        let deleted_by = args::required_str("deleted_by", args.deleted_by)?;

        let page = store
            .get(PAGES, &page_id)?
            .ok_or_else(|| ToolError::NotFound(format!("Page not found: page_id '{page_id}' does not exist")))?;
        if !args.hard_delete && page.is("status", "deleted") {
            return Err(ToolError::Rejected(format!("Page '{page_id}' is already deleted")));
        }
        if page.is("status", "locked") {
            return Err(ToolError::Rejected(format!("Cannot delete locked page: page_id '{page_id}'")));
        }
        if page.is("status", "archived") {
            return Err(ToolError::Rejected(format!(
                "Cannot delete archived page: page_id '{page_id}'. Unarchive it first."
            )));
        }
        let title = page.str_or("title", "Unknown").to_string();
        if !store.contains(USERS, &deleted_by)? {
            return Err(ToolError::NotFound(format!(
                "User not found: deleted_by '{deleted_by}' does not exist"
            )));
        }
        let live_children = store
            .records(PAGES)?
            .filter(|(_, page)| page.refers_to("parent_page_id", &page_id) && !page.is("status", "deleted"))
            .count();
        if live_children > 0 {
            return Err(ToolError::Rejected(format!(
                "Cannot delete page '{page_id}': page has child pages. Reassign children first using edit_page."
            )));
        }

        if args.hard_delete {
            store.remove(PAGES, &page_id)?;
            info!(page_id = %page_id, deleted_by = %deleted_by, "Page permanently deleted");
            return Ok(json!({
                "success": true,
                "message": format!("Page '{title}' (ID: {page_id}) permanently deleted"),
                "delete_type": "hard",
                "page_id": page_id,
                "title": title
            }));
        }

        let now = store.now();
        let page = lookup::record_mut(store, PAGES, &page_id, "Page")?;
        page.insert("status".into(), json!("deleted"));
        page.insert("updated_by".into(), json!(deleted_by));
        page.insert("updated_at".into(), json!(now));
        info!(page_id = %page_id, deleted_by = %deleted_by, "Page marked as deleted");
        Ok(json!({
            "success": true,
            "message": format!("Page '{title}' (ID: {page_id}) marked as deleted"),
            "delete_type": "soft",
            "page_id": page_id,
            "title": title,
            "deleted_by": deleted_by,
            "deleted_at": now
        }))
    }
}

#[derive(Deserialize)]
struct RetrievePageArgs {
    #[serde(default, deserialize_with = "opt_id")]
    page_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    space_id: Option<String>,
    /// `"null"` or `"none"` selects root pages.
    #[serde(default, deserialize_with = "opt_id")]
    parent_page_id: Option<String>,
    title: Option<String>,
    status: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    created_by: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    updated_by: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

pub struct RetrievePageTool;

impl Tool for RetrievePageTool {
    fn name(&self) -> &str {
        "retrieve_page"
    }

    fn description(&self) -> &str {
        "Search pages. All filters combine with AND; title matches case-insensitively on any part, \
         timestamps match by prefix. No filters returns every page."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": {"type": "string"},
                "space_id": {"type": "string"},
                "parent_page_id": {"type": "string", "description": "Use \"null\" for root pages."},
                "title": {"type": "string"},
                "status": {"type": "string", "enum": PAGE_STATUSES},
                "created_by": {"type": "string"},
                "updated_by": {"type": "string"},
                "created_at": {"type": "string"},
                "updated_at": {"type": "string"}
            },
            "required": []
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAGES])?;
        let args: RetrievePageArgs = args::parse(args)?;
        if let Some(status) = args.status.as_deref().filter(|s| !s.is_empty()) {
            one_of("status", status, PAGE_STATUSES)?;
        }
        let title = args.title.as_deref().map(contains_ci).transpose()?;
        let root_only = args
            .parent_page_id
            .as_deref()
            .is_some_and(|p| matches!(p.to_lowercase().as_str(), "null" | "none"));

        let pages: Vec<Value> = store
            .records(PAGES)?
            .filter(|(key, page)| {
                let id_ok = args.page_id.as_deref().map_or(true, |id| {
                    page.id_field("page_id").as_deref().unwrap_or(key.as_str()) == id
                });
                let parent_ok = match args.parent_page_id.as_deref() {
                    None => true,
                    Some(_) if root_only => page.id_field("parent_page_id").is_none(),
                    Some(parent) => page.refers_to("parent_page_id", parent),
                };
                id_ok
                    && parent_ok
                    && args.space_id.as_deref().map_or(true, |s| page.refers_to("space_id", s))
                    && args.created_by.as_deref().map_or(true, |u| page.refers_to("created_by", u))
                    && args.updated_by.as_deref().map_or(true, |u| page.refers_to("updated_by", u))
                    && title.as_ref().map_or(true, |re| page.str_field("title").is_some_and(|t| re.is_match(t)))
                    && args.status.as_deref().map_or(true, |s| page.is("status", s))
                    && args.created_at.as_deref().map_or(true, |p| prefix_match(page.str_field("created_at"), p))
                    && args.updated_at.as_deref().map_or(true, |p| prefix_match(page.str_field("updated_at"), p))
            })
            .map(|(_, page)| Value::Object(page.clone()))
            .collect();
        Ok(json!({"success": true, "count": pages.len(), "pages": pages}))
    }
}

#[derive(Deserialize)]
struct RetrieveSpaceArgs {
    #[serde(default, deserialize_with = "opt_id")]
    space_id: Option<String>,
    space_key: Option<String>,
    name: Option<String>,
    description: Option<String>,
    #[serde(rename = "type")]
    space_type: Option<String>,
    status: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    created_by: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

pub struct RetrieveSpaceTool;

impl Tool for RetrieveSpaceTool {
    fn name(&self) -> &str {
        "retrieve_space"
    }

    fn description(&self) -> &str {
        "Search spaces by ID, key, type, status or author; name and description match \
         case-insensitively on any part."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "space_id": {"type": "string"},
                "space_key": {"type": "string"},
                "name": {"type": "string"},
                "description": {"type": "string"},
                "type": {"type": "string", "enum": SPACE_TYPES},
                "status": {"type": "string", "enum": SPACE_STATUSES},
                "created_by": {"type": "string"},
                "created_at": {"type": "string"},
                "updated_at": {"type": "string"}
            },
            "required": []
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[SPACES])?;
        let args: RetrieveSpaceArgs = args::parse(args)?;
        opt_one_of("type", args.space_type.as_deref(), SPACE_TYPES)?;
        opt_one_of("status", args.status.as_deref(), SPACE_STATUSES)?;
        let name = args.name.as_deref().map(contains_ci).transpose()?;
        let description = args.description.as_deref().map(contains_ci).transpose()?;

        let spaces: Vec<Value> = store
            .records(SPACES)?
            .map(|(_, space)| space)
            .filter(|space| {
                args.space_id.as_deref().map_or(true, |id| space.refers_to("space_id", id))
                    && args.space_key.as_deref().map_or(true, |k| space.is("space_key", k))
                    && args.space_type.as_deref().map_or(true, |t| space.is("type", t))
                    && args.status.as_deref().map_or(true, |s| space.is("status", s))
                    && args.created_by.as_deref().map_or(true, |u| space.refers_to("created_by", u))
                    && name.as_ref().map_or(true, |re| space.str_field("name").is_some_and(|n| re.is_match(n)))
                    && description
                        .as_ref()
                        .map_or(true, |re| space.str_field("description").is_some_and(|d| re.is_match(d)))
                    && args.created_at.as_deref().map_or(true, |p| prefix_match(space.str_field("created_at"), p))
                    && args.updated_at.as_deref().map_or(true, |p| prefix_match(space.str_field("updated_at"), p))
            })
            .map(|space| Value::Object(space.clone()))
            .collect();
        Ok(json!({"success": true, "count": spaces.len(), "spaces": spaces}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::fixtures;

    #[test]
    fn establish_page_under_parent() {
        let mut store = fixtures::store();
        let out = EstablishPageTool
            .invoke(&mut store, json!({"space_id": 1, "title": "Cache Flush", "created_by": "2", "parent_page_id": "2"}))
            .expect("page");
        assert_eq!(out["page"]["page_id"], "6");
        assert_eq!(out["page"]["status"], "current");
        assert_eq!(out["page"]["body_storage"], "");
        assert_eq!(out["page"]["updated_by"], "2");
        assert_eq!(out["page"]["created_at"], "2025-11-16T23:59:00");
    }

    #[test]
    fn establish_page_rejects_bad_input() {
        let mut store = fixtures::store();
        let err = EstablishPageTool
            .invoke(&mut store, json!({"space_id": "1", "title": "X", "created_by": "1", "status": "locked"}))
            .unwrap_err();
        assert!(err.to_string().contains("Pages cannot be created with 'deleted' or 'locked' status"));

        let err = EstablishPageTool
            .invoke(&mut store, json!({"space_id": "1", "title": "X", "created_by": "1", "parent_page_id": "4"}))
            .unwrap_err();
        assert!(err.to_string().ends_with("Parent and child must be in the same space."));

        let err = EstablishPageTool
            .invoke(&mut store, json!({"space_id": "1", "title": "runbooks", "created_by": "1", "parent_page_id": "1"}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Duplicate title: A page with title 'runbooks'"));

        let err = EstablishPageTool
            .invoke(&mut store, json!({"space_id": "9", "title": "X", "created_by": "1"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Space with ID '9' not found");
    }

    #[test]
    fn edit_page_blocks_cycles() {
        let mut store = fixtures::store();
        let err = EditPageTool
            .invoke(&mut store, json!({"page_id": "1", "updated_by": "1", "parent_page_id": "3"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot create circular parent relationship");

        let err = EditPageTool
            .invoke(&mut store, json!({"page_id": "2", "updated_by": "1", "parent_page_id": "2"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot set a page as its own parent");
    }

    #[test]
    fn edit_page_moves_to_root_and_checks_siblings() {
        let mut store = fixtures::store();
        let out = EditPageTool
            .invoke(&mut store, json!({"page_id": "3", "updated_by": "2", "parent_page_id": ""}))
            .expect("moved");
        assert_eq!(out["page"]["parent_page_id"], Value::Null);
        assert_eq!(out["page"]["updated_by"], "2");

        let err = EditPageTool
            .invoke(&mut store, json!({"page_id": "3", "updated_by": "2", "title": "HOME"}))
            .unwrap_err();
        assert!(err.to_string().contains("root level of space '1'"));
    }

    #[test]
    fn edit_page_rejects_archived_space_and_unknown_page() {
        let mut store = fixtures::store();
        let err = EditPageTool
            .invoke(&mut store, json!({"page_id": "3", "updated_by": "2", "space_id": "2"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot move page to archived space: space_id '2'");

        let err = EditPageTool
            .invoke(&mut store, json!({"page_id": "42", "updated_by": "2"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Page not found: page_id '42' does not exist");
    }

    #[test]
    fn remove_page_soft_then_hard() {
        let mut store = fixtures::store();
        let err = RemovePageTool
            .invoke(&mut store, json!({"page_id": "2", "deleted_by": "1"}))
            .unwrap_err();
        assert!(err.to_string().contains("Reassign children first"));

        let out = RemovePageTool
            .invoke(&mut store, json!({"page_id": "3", "deleted_by": "1"}))
            .expect("soft");
        assert_eq!(out["delete_type"], "soft");
        let err = RemovePageTool
            .invoke(&mut store, json!({"page_id": "3", "deleted_by": "1"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Page '3' is already deleted");

        let out = RemovePageTool
            .invoke(&mut store, json!({"page_id": "3", "deleted_by": "1", "hard_delete": true}))
            .expect("hard");
        assert_eq!(out["delete_type"], "hard");
        assert!(!store.contains(PAGES, "3").expect("table"));
    }

    fn add_space(store: &mut Store, space_id: &str) {
        let space = json!({"space_id": space_id, "space_key": "OPS", "name": "Operations",
                           "type": "global", "status": "current"});
        store
            .insert(SPACES, space_id, space.as_object().cloned().expect("object"))
            .expect("insert");
    }

    #[test]
    fn moving_space_requires_a_parent_in_that_space() {
        let mut store = fixtures::store();
        add_space(&mut store, "3");
        let err = EditPageTool
            .invoke(&mut store, json!({"page_id": "3", "updated_by": "1", "space_id": "3"}))
            .unwrap_err();
        assert!(err.to_string().contains("same space"), "{err}");
        let page = store.get(PAGES, "3").expect("table").expect("page");
        assert_eq!(page.id_field("space_id").as_deref(), Some("1"));

        let out = EditPageTool
            .invoke(
                &mut store,
                json!({"page_id": "3", "updated_by": "1", "space_id": "3", "parent_page_id": ""}),
            )
            .expect("moved as root");
        assert_eq!(out["page"]["space_id"], "3");
        assert!(out["page"]["parent_page_id"].is_null());
    }

    #[test]
    fn moving_space_is_rejected_while_children_remain() {
        let mut store = fixtures::store();
        add_space(&mut store, "3");
        let err = EditPageTool
            .invoke(
                &mut store,
                json!({"page_id": "2", "updated_by": "1", "space_id": "3", "parent_page_id": ""}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("page has child pages"));
    }

    #[test]
    fn soft_deleted_children_do_not_block_removal() {
        let mut store = fixtures::store();
        RemovePageTool
            .invoke(&mut store, json!({"page_id": "3", "deleted_by": "1"}))
            .expect("child soft-deleted");
        let out = RemovePageTool
            .invoke(&mut store, json!({"page_id": "2", "deleted_by": "1"}))
            .expect("parent removed");
        assert_eq!(out["success"], true);
    }

    #[test]
    fn remove_page_respects_locks_and_archive() {
        let mut store = fixtures::store();
        let err = RemovePageTool
            .invoke(&mut store, json!({"page_id": "5", "deleted_by": "1"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot delete locked page: page_id '5'");
        let err = RemovePageTool
            .invoke(&mut store, json!({"page_id": "4", "deleted_by": "1"}))
            .unwrap_err();
        assert!(err.to_string().ends_with("Unarchive it first."));
    }

    #[test]
    fn retrieve_page_filters() {
        let mut store = fixtures::store();
        let out = RetrievePageTool.invoke(&mut store, json!({"parent_page_id": "null"})).expect("roots");
        assert_eq!(out["count"], 2);

        let out = RetrievePageTool
            .invoke(&mut store, json!({"title": "fail", "space_id": 1}))
            .expect("search");
        assert_eq!(out["pages"][0]["page_id"], "3");

        let out = RetrievePageTool.invoke(&mut store, json!({"created_at": "2025-0"})).expect("prefix");
        assert_eq!(out["count"], 4);

        let err = RetrievePageTool.invoke(&mut store, json!({"status": "gone"})).unwrap_err();
        assert!(err.to_string().starts_with("Invalid status. Must be one of"));
    }

    #[test]
    fn retrieve_space_filters() {
        let mut store = fixtures::store();
        let out = RetrieveSpaceTool.invoke(&mut store, json!({"name": "LEGACY"})).expect("spaces");
        assert_eq!(out["count"], 1);
        assert_eq!(out["spaces"][0]["space_key"], "OLD");

        let out = RetrieveSpaceTool.invoke(&mut store, json!({"description": "handbook"})).expect("spaces");
        assert_eq!(out["spaces"][0]["space_id"], "1");

        let err = RetrieveSpaceTool.invoke(&mut store, json!({"type": "team"})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid type. Must be one of: global, personal");
    }
}
