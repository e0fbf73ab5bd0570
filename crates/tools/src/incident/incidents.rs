use super::{CLIENTS, CONFIGURATION_ITEMS, INCIDENTS, PROBLEM_TICKETS, USERS, WORK_NOTES};
use crate::args::{self, opt_id, Action};
use crate::validate::one_of;
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::{next_numeric_id, next_sequence_number};
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const SEVERITIES: &[&str] = &["P1", "P2", "P3", "P4"];
const IMPACTS: &[&str] = &["critical", "high", "medium", "low"];
const URGENCIES: &[&str] = &["critical", "high", "medium", "low"];
const CATEGORIES: &[&str] = &["inquiry/help", "software", "hardware", "Network", "Database"];
const STATUSES: &[&str] = &["open", "in_progress", "monitoring", "resolved", "closed"];

const REQUIRED_ON_CREATE: &[&str] = &[
    "title",
    "description",
    "client_id",
    "affected_ci_id",
    "severity",
    "impact",
    "urgency",
    "reported_by",
    "detection_time",
];

const EDITABLE: &[&str] = &[
    "title",
    "description",
    "category",
    "client_id",
    "affected_ci_id",
    "severity",
    "impact",
    "urgency",
    "status",
    "reported_by",
    "assigned_to",
    "problem_id",
    "detection_time",
    "acknowledged_at",
    "resolved_at",
    "closed_at",
];

/// Incident fields holding references to other tables, stored as string IDs.
const REFERENCE_FIELDS: &[&str] = &["client_id", "affected_ci_id", "reported_by", "assigned_to", "problem_id"];

/// Present, non-blank identifier in an incident payload.
fn payload_id(data: &Record, key: &str) -> Option<String> {
    data.id_field(key).filter(|id| !id.trim().is_empty())
}

/// Referential and enum checks for whichever incident fields are present.
fn validate_incident_fields(store: &Store, data: &Record) -> Result<(), ToolError> {
    let references = [
        ("client_id", CLIENTS, "Client"),
        ("affected_ci_id", CONFIGURATION_ITEMS, "Configuration item"),
        ("reported_by", USERS, "User"),
        ("assigned_to", USERS, "User"),
        ("problem_id", PROBLEM_TICKETS, "Problem ticket"),
    ];
    for (field, table, label) in references {
        if let Some(id) = payload_id(data, field) {
            lookup::ensure(store, table, &id, label)?;
        }
    }
    let enums = [
        ("severity", SEVERITIES),
        ("impact", IMPACTS),
        ("urgency", URGENCIES),
        ("category", CATEGORIES),
        ("status", STATUSES),
    ];
    for (field, allowed) in enums {
        match data.get(field) {
            None | Some(Value::Null) => {}
            Some(value) => one_of(field, value.as_str().unwrap_or_default(), allowed)?,
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct ManageIncidentArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    incident_id: Option<String>,
    incident_data: Option<Map<String, Value>>,
}

pub struct ManageIncidentsTool;

impl ManageIncidentsTool {
    fn create(&self, store: &mut Store, data: Map<String, Value>) -> Result<Value, ToolError> {
        let missing = args::missing_fields(&Value::Object(data.clone()), REQUIRED_ON_CREATE);
        if !missing.is_empty() {
            return Err(ToolError::InvalidArgs(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        args::only_fields(&Value::Object(data.clone()), EDITABLE)?;
        validate_incident_fields(store, &data)?;

        let incidents = store.table(INCIDENTS)?;
        let incident_id = next_numeric_id(incidents);
        let incident_number = next_sequence_number(incidents, "incident_number", "INC", 7);
        let now = store.now();
        let incident = json!({
            "incident_id": incident_id,
            "problem_id": payload_id(&data, "problem_id"),
            "incident_number": incident_number,
            "title": data.get("title"),
            "description": data.get("description"),
            "category": data.get("category"),
            "client_id": payload_id(&data, "client_id"),
            "affected_ci_id": payload_id(&data, "affected_ci_id"),
            "severity": data.get("severity"),
            "impact": data.get("impact"),
            "urgency": data.get("urgency"),
            "status": data.get("status").cloned().unwrap_or_else(|| json!("open")),
            "reported_by": payload_id(&data, "reported_by"),
            "assigned_to": payload_id(&data, "assigned_to"),
            "detection_time": data.get("detection_time"),
            "acknowledged_at": data.get("acknowledged_at"),
            "resolved_at": data.get("resolved_at"),
            "closed_at": data.get("closed_at"),
            "created_at": now,
            "updated_at": now
        });
        store.insert(INCIDENTS, &incident_id, incident.as_object().cloned().unwrap_or_default())?;
        info!(incident_id = %incident_id, number = %incident_number, "Incident created");
        Ok(incident)
    }

    fn update(&self, store: &mut Store, incident_id: &str, data: Map<String, Value>) -> Result<Value, ToolError> {
        args::only_fields(&Value::Object(data.clone()), EDITABLE)?;
        validate_incident_fields(store, &data)?;

        let now = store.now();
        let incident = lookup::record_mut(store, INCIDENTS, incident_id, "Incident")?;
        for (key, value) in &data {
            let value = if REFERENCE_FIELDS.contains(&key.as_str()) {
                json!(payload_id(&data, key))
            } else {
                value.clone()
            };
            incident.insert(key.clone(), value);
        }
        // Entering a terminal status stamps its timestamp unless one was supplied.
        for (status, stamp) in [("resolved", "resolved_at"), ("closed", "closed_at")] {
            if incident.is("status", status) && incident.get(stamp).map_or(true, Value::is_null) {
                incident.insert(stamp.into(), json!(now));
            }
        }
        incident.insert("updated_at".into(), json!(now));
        info!(incident_id = %incident_id, "Incident updated");
        Ok(Value::Object(incident.clone()))
    }
}

impl Tool for ManageIncidentsTool {
    fn name(&self) -> &str {
        "manage_incidents"
    }

    fn description(&self) -> &str {
        "Create or update incidents. Creation assigns the next INC number; updates validate \
         every supplied field the same way creation does."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "incident_id": {"type": "string", "description": "Required for update."},
                "incident_data": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "description": {"type": "string"},
                        "category": {"type": "string", "enum": CATEGORIES},
                        "client_id": {"type": "string"},
                        "affected_ci_id": {"type": "string"},
                        "severity": {"type": "string", "enum": SEVERITIES},
                        "impact": {"type": "string", "enum": IMPACTS},
                        "urgency": {"type": "string", "enum": URGENCIES},
                        "status": {"type": "string", "enum": STATUSES},
                        "reported_by": {"type": "string"},
                        "assigned_to": {"type": "string"},
                        "problem_id": {"type": "string"},
                        "detection_time": {"type": "string", "description": "YYYY-MM-DDTHH:MM:SS"},
                        "acknowledged_at": {"type": "string"},
                        "resolved_at": {"type": "string"},
                        "closed_at": {"type": "string"}
                    }
                }
            },
            "required": ["action"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[INCIDENTS, CLIENTS, CONFIGURATION_ITEMS, USERS, PROBLEM_TICKETS])?;
        let args: ManageIncidentArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &[])?;
        let data = args.incident_data.filter(|d| !d.is_empty());
        match action {
            Action::Create => {
                let data = data.ok_or_else(|| {
                    ToolError::InvalidArgs("incident_data is required for create action".into())
                })?;
                self.create(store, data)
            }
            Action::Update => {
                let incident_id = args
                    .incident_id
                    .map(|id| id.trim().trim_matches('"').to_string())
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ToolError::InvalidArgs("incident_id is required for update action".into()))?;
                lookup::ensure(store, INCIDENTS, &incident_id, "Incident")?;
                let data = data.ok_or_else(|| {
                    ToolError::InvalidArgs("incident_data is required for update action".into())
                })?;
                self.update(store, &incident_id, data)
            }
        }
    }
}

#[derive(Deserialize)]
struct ManageWorkNoteArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    note_id: Option<String>,
    note_data: Option<Map<String, Value>>,
}

fn note_text(data: &Record) -> Result<String, ToolError> {
    match data.str_field("note_text") {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(ToolError::InvalidArgs("note_text must be a non-empty string".into())),
    }
}

pub struct ManageWorkNotesTool;

impl Tool for ManageWorkNotesTool {
    fn name(&self) -> &str {
        "manage_work_notes"
    }

    fn description(&self) -> &str {
        "Add a work note to an incident, or edit the text of an existing note."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "note_id": {"type": "string", "description": "Required for update."},
                "note_data": {
                    "type": "object",
                    "properties": {
                        "incident_id": {"type": "string"},
                        "note_text": {"type": "string"},
                        "created_by": {"type": "string"}
                    }
                }
            },
            "required": ["action", "note_data"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[WORK_NOTES, INCIDENTS, USERS])?;
        let args: ManageWorkNoteArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &[])?;
        let data = args.note_data.filter(|d| !d.is_empty());
        let now = store.now();

        if action == Action::Create {
            let data = data
                .ok_or_else(|| ToolError::InvalidArgs("note_data is required for create action".into()))?;
            let missing: Vec<&str> = ["incident_id", "note_text", "created_by"]
                .into_iter()
                .filter(|f| !data.contains_key(*f))
                .collect();
            if !missing.is_empty() {
                return Err(ToolError::InvalidArgs(format!(
                    "Missing required fields: {}",
                    missing.join(", ")
                )));
            }
            let incident_id = data.id_field("incident_id").unwrap_or_default();
            lookup::ensure(store, INCIDENTS, &incident_id, "Incident")?;
            let created_by = data.id_field("created_by").unwrap_or_default();
            lookup::ensure(store, USERS, &created_by, "User")?;
            let text = note_text(&data)?;

            let note_id = next_numeric_id(store.table(WORK_NOTES)?);
            let note = json!({
                "note_id": note_id,
                "incident_id": incident_id,
                "note_text": text,
                "created_by": created_by,
                "created_at": now,
                "updated_at": now
            });
            store.insert(WORK_NOTES, &note_id, note.as_object().cloned().unwrap_or_default())?;
            info!(note_id = %note_id, incident_id = %incident_id, "Work note added");
            return Ok(note);
        }

        let note_id = args::required_str("note_id", args.note_id)
            .map_err(|_| ToolError::InvalidArgs("note_id is required for update action".into()))?;
        lookup::ensure(store, WORK_NOTES, &note_id, "Work note")?;
        let data =
            data.ok_or_else(|| ToolError::InvalidArgs("note_data is required for update action".into()))?;
        if !data.contains_key("note_text") {
            return Err(ToolError::InvalidArgs("Only note_text can be updated".into()));
        }
        let text = note_text(&data)?;
        let note = lookup::record_mut(store, WORK_NOTES, &note_id, "Work note")?;
        note.insert("note_text".into(), json!(text));
        note.insert("updated_at".into(), json!(now));
        info!(note_id = %note_id, "Work note edited");
        Ok(Value::Object(note.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::fixtures;

    fn new_incident() -> Value {
        json!({
            "title": "Login failures", "description": "SSO returns 500", "client_id": 1,
            "affected_ci_id": "1", "severity": "P2", "impact": "high", "urgency": "high",
            "reported_by": "1", "detection_time": "2025-10-01T09:00:00", "category": "software"
        })
    }

    #[test]
    fn create_assigns_next_incident_number() {
        let mut store = fixtures::store();
        let out = ManageIncidentsTool
            .invoke(&mut store, json!({"action": "create", "incident_data": new_incident()}))
            .expect("incident");
        assert_eq!(out["incident_id"], "3");
        assert_eq!(out["incident_number"], "INC0000003");
        assert_eq!(out["status"], "open");
        assert_eq!(out["client_id"], "1");
    }

    #[test]
    fn create_reports_missing_fields_and_bad_references() {
        let mut store = fixtures::store();
        let err = ManageIncidentsTool
            .invoke(&mut store, json!({"action": "create", "incident_data": {"title": "x"}}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Missing required fields: description, client_id"));

        let mut data = new_incident();
        data["client_id"] = json!("9");
        let err = ManageIncidentsTool
            .invoke(&mut store, json!({"action": "create", "incident_data": data}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Client with ID '9' not found");
    }

    #[test]
    fn update_stores_references_as_string_ids() {
        let mut store = fixtures::store();
        let out = ManageIncidentsTool
            .invoke(
                &mut store,
                json!({"action": "update", "incident_id": "1",
                       "incident_data": {"assigned_to": 3, "problem_id": " "}}),
            )
            .expect("updated");
        assert_eq!(out["assigned_to"], "3");
        assert!(out["problem_id"].is_null());
        let stored = store.get(INCIDENTS, "1").expect("table").expect("incident");
        assert_eq!(stored.str_field("assigned_to"), Some("3"));
    }

    #[test]
    fn update_validates_enums_and_stamps_resolution() {
        let mut store = fixtures::store();
        let err = ManageIncidentsTool
            .invoke(
                &mut store,
                json!({"action": "update", "incident_id": "2", "incident_data": {"severity": "P9"}}),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid severity. Must be one of: P1, P2, P3, P4");

        let out = ManageIncidentsTool
            .invoke(
                &mut store,
                json!({"action": "update", "incident_id": "\"2\"", "incident_data": {"status": "resolved"}}),
            )
            .expect("updated");
        assert_eq!(out["resolved_at"], "2025-11-16T23:59:00");
        assert_eq!(out["updated_at"], "2025-11-16T23:59:00");
    }

    #[test]
    fn work_notes_are_created_and_edited() {
        let mut store = fixtures::store();
        let note = ManageWorkNotesTool
            .invoke(
                &mut store,
                json!({"action": "create", "note_data": {"incident_id": 1, "note_text": "Rolled back", "created_by": "1"}}),
            )
            .expect("note");
        assert_eq!(note["note_id"], "1");

        let err = ManageWorkNotesTool
            .invoke(&mut store, json!({"action": "update", "note_id": "1", "note_data": {"created_by": "3"}}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Only note_text can be updated");

        let edited = ManageWorkNotesTool
            .invoke(&mut store, json!({"action": "update", "note_id": "1", "note_data": {"note_text": "Rolled back v2"}}))
            .expect("edited");
        assert_eq!(edited["note_text"], "Rolled back v2");
    }

    #[test]
    fn blank_note_text_is_rejected() {
        let mut store = fixtures::store();
        let err = ManageWorkNotesTool
            .invoke(
                &mut store,
                json!({"action": "create", "note_data": {"incident_id": "1", "note_text": "  ", "created_by": "1"}}),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "note_text must be a non-empty string");
    }
}
