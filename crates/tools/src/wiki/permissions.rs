//! Permission queries over spaces and pages.
//!
//! Grants on a page flow down to its descendants, and grants on a space cover every page
//! in it. `lookup_permissions` resolves that inheritance fully; `get_permissions` returns
//! raw grants and only falls back to the space when a page has none of its own.

use super::hierarchy::ancestors;
use super::{PAGES, PERMISSIONS, SPACES, USERS};
use crate::args::{self, opt_id};
use crate::validate::opt_one_of;
use crate::{Tool, ToolError};
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

const CONTENT_TYPES: &[&str] = &["space", "page"];

#[derive(Deserialize)]
struct PermissionArgs {
    #[serde(default, deserialize_with = "opt_id")]
    user_id: Option<String>,
    content_type: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    content_id: Option<String>,
}

/// Check the user and, when given, the content reference.
fn check_subject(
    store: &Store,
    user_id: &str,
    content_type: Option<&str>,
    content_id: Option<&str>,
) -> Result<(), ToolError> {
    opt_one_of("content_type", content_type, CONTENT_TYPES)?;
    if !store.contains(USERS, user_id)? {
        return Err(ToolError::NotFound(format!("Invalid user_id: '{user_id}'. User not found")));
    }
    let Some(content_id) = content_id else {
        return Ok(());
    };
    match content_type {
        Some("space") if !store.contains(SPACES, content_id)? => Err(ToolError::NotFound(format!(
            "content_id '{content_id}' does not reference a valid space"
        ))),
        Some("page") if !store.contains(PAGES, content_id)? => Err(ToolError::NotFound(format!(
            "content_id '{content_id}' does not reference a valid page"
        ))),
        None if !store.contains(SPACES, content_id)? && !store.contains(PAGES, content_id)? => {
            Err(ToolError::NotFound(format!(
                "content_id '{content_id}' must reference an existing space or page"
            )))
        }
        _ => Ok(()),
    }
}

fn grants<'a>(
    store: &'a Store,
    user_id: &'a str,
    content_type: Option<&'a str>,
    content_id: Option<&'a str>,
) -> Result<impl Iterator<Item = &'a Record> + 'a, ToolError> {
    Ok(store.records(PERMISSIONS)?.map(|(_, p)| p).filter(move |p| {
        p.refers_to("user_id", user_id)
            && content_type.map_or(true, |t| p.is("content_type", t))
            && content_id.map_or(true, |id| p.refers_to("content_id", id))
    }))
}

/// Space containing the topmost page reachable from `page_id`.
fn root_space(store: &Store, page_id: &str, chain: &[String]) -> Result<Option<String>, ToolError> {
    let candidates = std::iter::once(page_id).chain(chain.iter().map(String::as_str)).rev();
    for id in candidates {
        if let Some(page) = store.get(PAGES, id)? {
            return Ok(page.id_field("space_id"));
        }
    }
    Ok(None)
}

pub struct LookupPermissionsTool;

impl Tool for LookupPermissionsTool {
    fn name(&self) -> &str {
        "lookup_permissions"
    }

    fn description(&self) -> &str {
        "Effective permissions of a user on a space or page. For pages this includes grants \
         inherited from every ancestor page and from the containing space, one entry per operation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "content_type": {"type": "string", "enum": CONTENT_TYPES},
                "content_id": {"type": "string", "description": "space_id or page_id"}
            },
            "required": ["user_id", "content_type", "content_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PERMISSIONS, USERS, SPACES, PAGES])?;
        let args: PermissionArgs = args::parse(args)?;
        let user_id = args::required_str("user_id", args.user_id)?;
        let content_type = args::required_str("content_type", args.content_type)?;
        let content_id = args::required_str("content_id", args.content_id)?;
        check_subject(store, &user_id, Some(content_type.as_str()), Some(content_id.as_str()))?;

        let mut scopes = vec![(content_type.clone(), content_id.clone())];
        if content_type == "page" {
            let chain = ancestors(store, &content_id)?;
            let space = root_space(store, &content_id, &chain)?;
            scopes.extend(chain.into_iter().map(|id| ("page".to_string(), id)));
            scopes.extend(space.map(|id| ("space".to_string(), id)));
        }

        let mut seen = HashSet::new();
        let mut permissions = Vec::new();
        for (scope_type, scope_id) in &scopes {
            for grant in grants(store, &user_id, Some(scope_type.as_str()), Some(scope_id.as_str()))? {
                let operation = grant.str_or("operation", "").to_string();
                if seen.insert(operation.clone()) {
                    permissions.push(json!({"operation": operation, "user_id": user_id}));
                }
            }
        }
        Ok(json!({"success": true, "count": permissions.len(), "permissions": permissions}))
    }
}

pub struct GetPermissionsTool;

impl Tool for GetPermissionsTool {
    fn name(&self) -> &str {
        "get_permissions"
    }

    fn description(&self) -> &str {
        "Permission grants held by a user, optionally narrowed to a content type and ID. \
         A page with no direct grant falls back to the grants on its space."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "content_type": {"type": "string", "enum": CONTENT_TYPES},
                "content_id": {"type": "string"}
            },
            "required": ["user_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PERMISSIONS, USERS, SPACES, PAGES])?;
        let args: PermissionArgs = args::parse(args)?;
        let user_id = args::required_str("user_id", args.user_id)?;
        let content_type = args.content_type.as_deref();
        let content_id = args.content_id.as_deref();
        check_subject(store, &user_id, content_type, content_id)?;

        let mut matched: Vec<Value> = grants(store, &user_id, content_type, content_id)?
            .map(|p| Value::Object(p.clone()))
            .collect();

        let page_request = match (content_type, content_id) {
            (Some(t), _) => t == "page",
            (None, Some(id)) => store.contains(PAGES, id)?,
            (None, None) => false,
        };
        if page_request && matched.is_empty() {
            if let Some(page) = content_id.map(|id| store.get(PAGES, id)).transpose()?.flatten() {
                let space_id = page.id_field("space_id").unwrap_or_default();
                matched = grants(store, &user_id, Some("space"), Some(space_id.as_str()))?
                    .map(|p| Value::Object(p.clone()))
                    .collect();
            }
        }
        Ok(json!({"success": true, "count": matched.len(), "permissions": matched}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::fixtures;

    #[test]
    fn lookup_inherits_from_ancestors_and_space() {
        let mut store = fixtures::store();
        let out = LookupPermissionsTool
            .invoke(&mut store, json!({"user_id": "2", "content_type": "page", "content_id": "3"}))
            .expect("permissions");
        // read on page 3, update on page 2, read again on space 1
        assert_eq!(out["count"], 2);
        assert_eq!(out["permissions"][0], json!({"operation": "read", "user_id": "2"}));
        assert_eq!(out["permissions"][1]["operation"], "update");
    }

    #[test]
    fn lookup_on_space_is_direct_only() {
        let mut store = fixtures::store();
        let out = LookupPermissionsTool
            .invoke(&mut store, json!({"user_id": 1, "content_type": "space", "content_id": 1}))
            .expect("permissions");
        assert_eq!(out["permissions"], json!([{"operation": "administer", "user_id": "1"}]));

        let err = LookupPermissionsTool
            .invoke(&mut store, json!({"user_id": "1", "content_type": "page", "content_id": "77"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "content_id '77' does not reference a valid page");
    }

    #[test]
    fn get_falls_back_to_space_for_pages_without_grants() {
        let mut store = fixtures::store();
        let out = GetPermissionsTool
            .invoke(&mut store, json!({"user_id": "1", "content_type": "page", "content_id": "2"}))
            .expect("permissions");
        assert_eq!(out["count"], 1);
        assert_eq!(out["permissions"][0]["operation"], "administer");

        let out = GetPermissionsTool
            .invoke(&mut store, json!({"user_id": "2", "content_id": "2"}))
            .expect("permissions");
        assert_eq!(out["permissions"][0]["operation"], "update");
    }

    #[test]
    fn get_lists_every_grant_for_a_user() {
        let mut store = fixtures::store();
        let out = GetPermissionsTool.invoke(&mut store, json!({"user_id": "2"})).expect("permissions");
        assert_eq!(out["count"], 3);

        let err = GetPermissionsTool
            .invoke(&mut store, json!({"user_id": "2", "content_type": "folder"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid content_type. Must be one of: space, page");
        let err = GetPermissionsTool.invoke(&mut store, json!({"user_id": "8"})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid user_id: '8'. User not found");
    }
}
