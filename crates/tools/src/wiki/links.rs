use super::{DATABASES, PAGES, SMART_LINKS, USERS, WHITEBOARDS};
use crate::args;
use crate::validate::one_of;
use crate::{Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const REQUIRED: &[&str] = &["title", "url", "host_page_id", "target_type", "target_id", "created_by"];
const TARGET_TYPES: &[&str] = &["page", "database", "whiteboard", "external"];

/// Table holding link targets of the given type; external targets live outside the store.
fn target_table(target_type: &str) -> Option<&'static str> {
    match target_type {
        "page" => Some(PAGES),
        "database" => Some(DATABASES),
        "whiteboard" => Some(WHITEBOARDS),
        _ => None,
    }
}

#[derive(Deserialize)]
struct SmartLinkArgs {
    payload: Option<Record>,
}

pub struct CreateSmartLinkTool;

impl Tool for CreateSmartLinkTool {
    fn name(&self) -> &str {
        "create_smart_link"
    }

    fn description(&self) -> &str {
        "Add a smart link to a host page. Links point at a page, database or whiteboard in the \
         wiki, or at an external resource."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "payload": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "url": {"type": "string"},
                        "host_page_id": {"type": "string"},
                        "target_type": {"type": "string", "enum": TARGET_TYPES},
                        "target_id": {"type": "string"},
                        "created_by": {"type": "string"}
                    },
                    "required": REQUIRED
                }
            },
            "required": ["payload"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[SMART_LINKS, USERS, PAGES])?;
        let args: SmartLinkArgs = args::parse(args)?;
        let payload = args::required("payload", args.payload)?;

        let created_by = payload.id_field("created_by").unwrap_or_default();
        if created_by.is_empty() || !store.contains(USERS, &created_by)? {
            return Err(ToolError::NotFound(format!("Invalid User ID '{created_by}'")));
        }
        if let Some(host) = payload.id_field("host_page_id").filter(|h| !h.is_empty()) {
            if !store.contains(PAGES, &host)? {
                return Err(ToolError::NotFound(format!("Host page with ID '{host}' does not exist")));
            }
        }
        let mut missing = args::missing_fields(&Value::Object(payload.clone()), REQUIRED);
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(ToolError::InvalidArgs(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        let target_type = payload.str_or("target_type", "");
        one_of("target_type", target_type, TARGET_TYPES)?;
        let target_id = payload.id_field("target_id").unwrap_or_default();
        if let Some(table) = target_table(target_type) {
            if !store.contains(table, &target_id)? {
                return Err(ToolError::NotFound(format!(
                    "{target_type}_id '{target_id}' does not exist in {table}"
                )));
            }
        }

        let link_id = next_numeric_id(store.table(SMART_LINKS)?);
        let now = store.now();
        let link = json!({
            "smart_link_id": link_id,
            "title": payload.get("title"),
            "url": payload.get("url"),
            "host_page_id": payload.id_field("host_page_id"),
            "target_type": target_type,
            "target_id": target_id,
            "created_by": created_by,
            "updated_by": created_by,
            "created_at": now,
            "updated_at": now
        });
        store.insert(SMART_LINKS, &link_id, link.as_object().cloned().unwrap_or_default())?;
        info!(smart_link_id = %link_id, target_type, "Smart link created");
        Ok(json!({"success": true, "smart_link_id": link_id, "data": link}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::fixtures;

    fn payload() -> Value {
        json!({"title": "Inventory DB", "url": "https://wiki.test/db/1", "host_page_id": "2",
               "target_type": "database", "target_id": "1", "created_by": "1"})
    }

    #[test]
    fn links_to_existing_database() {
        let mut store = fixtures::store();
        let out = CreateSmartLinkTool
            .invoke(&mut store, json!({"payload": payload()}))
            .expect("link");
        assert_eq!(out["smart_link_id"], "2");
        assert_eq!(out["data"]["updated_by"], "1");
        assert!(store.contains(SMART_LINKS, "2").expect("table"));
    }

    #[test]
    fn rejects_unknown_user_and_missing_target() {
        let mut store = fixtures::store();
        let mut bad = payload();
        bad["created_by"] = json!("7");
        let err = CreateSmartLinkTool.invoke(&mut store, json!({"payload": bad})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid User ID '7'");

        let mut bad = payload();
        bad["target_type"] = json!("whiteboard");
        bad["target_id"] = json!("9");
        let err = CreateSmartLinkTool.invoke(&mut store, json!({"payload": bad})).unwrap_err();
        assert_eq!(err.to_string(), "whiteboard_id '9' does not exist in whiteboards");
    }

    #[test]
    fn external_targets_and_missing_fields() {
        let mut store = fixtures::store();
        let mut ext = payload();
        ext["target_type"] = json!("external");
        ext["target_id"] = json!("status-page");
        assert!(CreateSmartLinkTool.invoke(&mut store, json!({"payload": ext})).is_ok());

        let err = CreateSmartLinkTool
            .invoke(&mut store, json!({"payload": {"created_by": "1", "url": " "}}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required fields: host_page_id, target_id, target_type, title, url"
        );
    }
}
