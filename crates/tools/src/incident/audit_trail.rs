use super::{AUDIT_TRAILS, USERS};
use crate::args::{self, opt_id, Action};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const REQUIRED: &[&str] = &[
    "reference_id",
    "reference_type",
    "action",
    "user_id",
    "field_name",
    "old_value",
    "new_value",
];

#[derive(Deserialize)]
struct LogAuditArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    audit_id: Option<String>,
    audit_data: Option<Map<String, Value>>,
}

/// Audit trail entries kept in the store, as opposed to the process audit log.
pub struct LogAuditRecordsTool;

impl Tool for LogAuditRecordsTool {
    fn name(&self) -> &str {
        "log_audit_records"
    }

    fn description(&self) -> &str {
        "Record a field change in the audit trail, or correct an existing audit entry."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "audit_id": {"type": "string", "description": "Required for update."},
                "audit_data": {
                    "type": "object",
                    "properties": {
                        "reference_id": {"type": "string"},
                        "reference_type": {"type": "string"},
                        "action": {"type": "string"},
                        "user_id": {"type": "string"},
                        "field_name": {"type": "string"},
                        "old_value": {},
                        "new_value": {}
                    }
                }
            },
            "required": ["action", "audit_data"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[AUDIT_TRAILS, USERS])?;
        let args: LogAuditArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &[])?;
        let data = args.audit_data.filter(|d| !d.is_empty());
        let now = store.now();

        match action {
            Action::Create => {
                let data = data
                    .ok_or_else(|| ToolError::InvalidArgs("audit_data is required for create action".into()))?;
                let missing: Vec<&str> = REQUIRED.iter().copied().filter(|f| !data.contains_key(*f)).collect();
                if !missing.is_empty() {
                    return Err(ToolError::InvalidArgs(format!(
                        "Missing required fields: {}",
                        missing.join(", ")
                    )));
                }
                let user_id = data.id_field("user_id").unwrap_or_default();
                lookup::ensure(store, USERS, &user_id, "User")?;

                let audit_id = next_numeric_id(store.table(AUDIT_TRAILS)?);
                let entry = json!({
                    "audit_id": audit_id,
                    "reference_id": data.id_field("reference_id"),
                    "reference_type": data.get("reference_type"),
                    "action": data.get("action"),
                    "user_id": user_id,
                    "field_name": data.get("field_name"),
                    "old_value": data.get("old_value"),
                    "new_value": data.get("new_value"),
                    "created_at": now
                });
                store.insert(AUDIT_TRAILS, &audit_id, entry.as_object().cloned().unwrap_or_default())?;
                info!(audit_id = %audit_id, user_id = %user_id, "Audit record logged");
                Ok(entry)
            }
            Action::Update => {
                let audit_id = args
                    .audit_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ToolError::InvalidArgs("audit_id is required for update action".into()))?;
                lookup::ensure(store, AUDIT_TRAILS, &audit_id, "Audit record")?;
                let data = data
                    .ok_or_else(|| ToolError::InvalidArgs("audit_data is required for update action".into()))?;
                if let Some(user_id) = data.id_field("user_id") {
                    lookup::ensure(store, USERS, &user_id, "User")?;
                }
                let entry = lookup::record_mut(store, AUDIT_TRAILS, &audit_id, "Audit record")?;
                // Only fields the entry already has can be corrected.
                for (key, value) in data {
                    if entry.contains_key(&key) && !value.is_null() && key != "audit_id" {
                        entry.insert(key, value);
                    }
                }
                entry.insert("created_at".into(), json!(now));
                info!(audit_id = %audit_id, "Audit record corrected");
                Ok(Value::Object(entry.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::fixtures;

    fn entry() -> Value {
        json!({"reference_id": 1, "reference_type": "incident", "action": "update", "user_id": "1",
               "field_name": "status", "old_value": "open", "new_value": "resolved"})
    }

    #[test]
    fn logs_and_corrects_entries() {
        let mut store = fixtures::store();
        let out = LogAuditRecordsTool
            .invoke(&mut store, json!({"action": "create", "audit_data": entry()}))
            .expect("audit");
        assert_eq!(out["audit_id"], "1");
        assert_eq!(out["reference_id"], "1");

        let out = LogAuditRecordsTool
            .invoke(
                &mut store,
                json!({"action": "update", "audit_id": "1", "audit_data": {"new_value": "closed", "extra": 1}}),
            )
            .expect("corrected");
        assert_eq!(out["new_value"], "closed");
        assert!(out.get("extra").is_none());
    }

    #[test]
    fn missing_fields_are_listed() {
        let mut store = fixtures::store();
        let err = LogAuditRecordsTool
            .invoke(&mut store, json!({"action": "create", "audit_data": {"reference_id": "1"}}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required fields: reference_type, action, user_id, field_name, old_value, new_value"
        );
    }

    #[test]
    fn unknown_user_is_rejected() {
        let mut store = fixtures::store();
        let mut data = entry();
        data["user_id"] = json!("99");
        let err = LogAuditRecordsTool
            .invoke(&mut store, json!({"action": "create", "audit_data": data}))
            .unwrap_err();
        assert_eq!(err.to_string(), "User with ID '99' not found");
    }
}
