use super::{active_user, APPROVAL_REQUESTS, USERS};
use crate::args::{self, opt_id, Action};
use crate::validate::one_of;
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::{next_numeric_id, prefixed};
use opsdesk_core::Store;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const REFERENCE_TYPES: &[&str] = &["escalation", "bridge", "change", "rollback", "incident_closure", "rca"];
const STATUSES: &[&str] = &["pending", "approved", "denied", "cancelled"];

/// `APR` followed by the approval ID padded to eight digits.
fn approval_number(approval_id: &str) -> String {
    approval_id
        .parse::<u64>()
        .map(|n| prefixed("APR", n, 8))
        .unwrap_or_else(|_| format!("APR{approval_id:0>8}"))
}

#[derive(Deserialize)]
struct ManageApprovalArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    approval_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    reference_id: Option<String>,
    reference_type: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    requested_by: Option<String>,
    requested_action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    approver: Option<String>,
    status: Option<String>,
    approval_notes: Option<String>,
}

pub struct ManageApprovalRequestsTool;

impl Tool for ManageApprovalRequestsTool {
    fn name(&self) -> &str {
        "manage_approval_requests"
    }

    fn description(&self) -> &str {
        "Create approval requests between active users, or record a decision on one. \
         Every change is appended to the request's history and bumps its version."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "approval_id": {"type": "string", "description": "Required for update."},
                "reference_id": {"type": "string"},
                "reference_type": {"type": "string", "enum": REFERENCE_TYPES},
                "requested_by": {"type": "string"},
                "requested_action": {"type": "string"},
                "approver": {"type": "string"},
                "status": {"type": "string", "enum": STATUSES},
                "approval_notes": {"type": "string"}
            },
            "required": ["action"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[APPROVAL_REQUESTS, USERS])?;
        let args: ManageApprovalArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &[])?;
        let now = store.now();
        let notes = args.approval_notes.map(|n| n.trim().to_string());

        match action {
            Action::Create => {
                let (Some(reference_id), Some(reference_type), Some(requested_by), Some(requested_action), Some(approver)) = (
                    args.reference_id.filter(|s| !s.is_empty()),
                    args.reference_type.filter(|s| !s.is_empty()),
                    args.requested_by.filter(|s| !s.is_empty()),
                    args.requested_action.filter(|s| !s.is_empty()),
                    args.approver.filter(|s| !s.is_empty()),
                ) else {
                    return Err(ToolError::InvalidArgs(
                        "reference_id, reference_type, requested_by, requested_action, and approver \
                         are required for create action"
                            .into(),
                    ));
                };
                active_user(store, &requested_by)?;
                active_user(store, &approver)?;
                one_of("reference_type", &reference_type, REFERENCE_TYPES)?;

                let approval_id = next_numeric_id(store.table(APPROVAL_REQUESTS)?);
                let number = approval_number(&approval_id);
                let approval = json!({
                    "approval_id": approval_id,
                    "approval_number": number,
                    "reference_id": reference_id,
                    "reference_type": reference_type,
                    "requested_by": requested_by,
                    "requested_action": requested_action,
                    "approver": approver,
                    "status": "pending",
                    "approval_notes": notes.filter(|n| !n.is_empty()),
                    "requested_at": now,
                    "responded_at": null,
                    "created_at": now,
                    "updated_at": now,
                    "last_modified_by": requested_by,
                    "version": 1,
                    "history": [{
                        "timestamp": now,
                        "action": "created",
                        "user_id": requested_by,
                        "details": "Approval request created"
                    }]
                });
                store.insert(
                    APPROVAL_REQUESTS,
                    &approval_id,
                    approval.as_object().cloned().unwrap_or_default(),
                )?;
                info!(approval_id = %approval_id, number = %number, "Approval request created");
                Ok(json!({
                    "success": true,
                    "action": "create",
                    "approval_id": approval_id,
                    "approval_number": number,
                    "approval_data": approval
                }))
            }
            Action::Update => {
                let approval_id = args
                    .approval_id
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ToolError::InvalidArgs("approval_id is required for update action".into()))?;
                lookup::ensure(store, APPROVAL_REQUESTS, &approval_id, "Approval request")?;
                if args.status.is_none() && notes.is_none() {
                    return Err(ToolError::InvalidArgs(
                        "At least one field must be provided for update".into(),
                    ));
                }
                if let Some(status) = args.status.as_deref() {
                    one_of("status", status, STATUSES)?;
                }
                if let Some(approver) = args.approver.as_deref() {
                    active_user(store, approver)?;
                }

                let approval = lookup::record_mut(store, APPROVAL_REQUESTS, &approval_id, "Approval request")?;
                let mut changes = Vec::new();
                if let Some(status) = args.status {
                    changes.push(json!({"field": "status", "old": approval.get("status"), "new": status}));
                    if matches!(status.as_str(), "approved" | "denied") {
                        approval.insert("responded_at".into(), json!(now));
                    }
                    approval.insert("status".into(), json!(status));
                }
                if let Some(notes) = notes {
                    changes.push(json!({"field": "approval_notes", "old": approval.get("approval_notes"), "new": notes}));
                    approval.insert("approval_notes".into(), json!(notes));
                }
                let version = approval.get("version").and_then(Value::as_u64).unwrap_or(1) + 1;
                approval.insert("version".into(), json!(version));
                approval.insert("updated_at".into(), json!(now));
                approval.insert("last_modified_by".into(), json!(args.approver));
                let entry = json!({
                    "timestamp": now,
                    "action": "updated",
                    "user_id": args.approver,
                    "changes": changes
                });
                match approval.get_mut("history").and_then(Value::as_array_mut) {
                    Some(history) => history.push(entry),
                    None => {
                        approval.insert("history".into(), json!([entry]));
                    }
                }
                let number = approval.get("approval_number").cloned();
                let approval = approval.clone();
                info!(approval_id = %approval_id, version, "Approval request updated");
                Ok(json!({
                    "success": true,
                    "action": "update",
                    "approval_id": approval_id,
                    "approval_number": number,
                    "approval_data": approval
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::fixtures;

    fn create(store: &mut Store) -> Value {
        ManageApprovalRequestsTool
            .invoke(
                store,
                json!({"action": "create", "reference_id": "1", "reference_type": "incident_closure",
                       "requested_by": "1", "requested_action": "close INC0000001", "approver": "3",
                       "approval_notes": "  after verification "}),
            )
            .expect("approval")
    }

    #[test]
    fn create_numbers_from_new_id() {
        let mut store = fixtures::store();
        let out = create(&mut store);
        assert_eq!(out["approval_number"], "APR00000001");
        assert_eq!(out["approval_data"]["approval_notes"], "after verification");
        assert_eq!(out["approval_data"]["history"][0]["action"], "created");
    }

    #[test]
    fn inactive_participants_are_rejected() {
        let mut store = fixtures::store();
        let err = ManageApprovalRequestsTool
            .invoke(
                &mut store,
                json!({"action": "create", "reference_id": "1", "reference_type": "rca",
                       "requested_by": "1", "requested_action": "x", "approver": "2"}),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "User with ID 2 is not active");
    }

    #[test]
    fn decision_records_history_and_response_time() {
        let mut store = fixtures::store();
        create(&mut store);
        let out = ManageApprovalRequestsTool
            .invoke(
                &mut store,
                json!({"action": "update", "approval_id": "1", "status": "approved", "approver": "3"}),
            )
            .expect("updated");
        let data = &out["approval_data"];
        assert_eq!(data["status"], "approved");
        assert_eq!(data["version"], 2);
        assert_eq!(data["responded_at"], "2025-11-16T23:59:00");
        assert_eq!(data["history"][1]["changes"][0]["old"], "pending");
    }

    #[test]
    fn update_needs_a_change() {
        let mut store = fixtures::store();
        create(&mut store);
        let err = ManageApprovalRequestsTool
            .invoke(&mut store, json!({"action": "update", "approval_id": "1"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "At least one field must be provided for update");
    }

    #[test]
    fn number_pads_to_eight_digits() {
        assert_eq!(approval_number("42"), "APR00000042");
    }
}
