//! Root cause analyses and post-incident reviews.

use super::{INCIDENTS, POST_INCIDENT_REVIEWS, ROOT_CAUSE_ANALYSES, USERS};
use crate::args::{self, opt_id, Action};
use crate::validate::one_of;
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::{next_numeric_id, prefixed};
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const ANALYSIS_METHODS: &[&str] = &["5_whys", "fishbone", "timeline", "fault_tree", "kepner_tregoe"];
const RCA_STATUSES: &[&str] = &["assigned", "in_progress", "completed", "approved"];
const RCA_CREATE_FIELDS: &[&str] = &[
    "rca_title",
    "incident_id",
    "assigned_to",
    "analysis_method",
    "root_cause_summary",
    "status",
    "due_date",
];
const RCA_UPDATE_FIELDS: &[&str] = &[
    "rca_title",
    "assigned_to",
    "analysis_method",
    "root_cause_summary",
    "status",
    "due_date",
    "completed_at",
    "approved_by",
];

const REVIEW_TYPES: &[&str] = &["Preliminary", "Detailed", "Final"];
const REVIEW_STATUSES: &[&str] = &["Draft", "In_Review", "Approved", "Published"];

fn number_for(prefix: &str, id: &str, width: usize) -> String {
    id.parse::<u64>()
        .map(|n| prefixed(prefix, n, width))
        .unwrap_or_else(|_| format!("{prefix}{id:0>width$}"))
}

/// RCA participants must be active users; failures halt.
fn active_rca_user(store: &Store, role: &str, user_id: &str) -> Result<(), ToolError> {
    let user = store
        .get(USERS, user_id)?
        .ok_or_else(|| ToolError::Halt(format!("User {role} not found")))?;
    if !user.is("status", "active") {
        return Err(ToolError::Halt(format!("User {role} must be active")));
    }
    Ok(())
}

fn check_rca_enums(data: &Record) -> Result<(), ToolError> {
    if let Some(method) = data.str_field("analysis_method").filter(|m| !m.is_empty()) {
        if !ANALYSIS_METHODS.contains(&method) {
            return Err(ToolError::Halt(format!(
                "Invalid analysis method - must be one of: {}",
                ANALYSIS_METHODS.join(", ")
            )));
        }
    }
    if let Some(status) = data.str_field("status").filter(|s| !s.is_empty()) {
        if !RCA_STATUSES.contains(&status) {
            return Err(ToolError::Halt(format!(
                "Invalid status - must be one of: {}",
                RCA_STATUSES.join(", ")
            )));
        }
    }
    Ok(())
}

/// Optional text fields store `null` for blank values.
fn text_or_null(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) if s.is_empty() => Value::Null,
        Value::String(s) => json!(s),
        other => json!(other.to_string()),
    }
}

#[derive(Deserialize)]
struct ManageRcaArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    rca_id: Option<String>,
    rca_data: Option<Map<String, Value>>,
}

pub struct ManageRootCauseAnalysesTool;

impl ManageRootCauseAnalysesTool {
    fn conduct(&self, store: &mut Store, data: Map<String, Value>) -> Result<Value, ToolError> {
        let missing: Vec<&str> = ["incident_id", "rca_title", "assigned_to", "due_date"]
            .into_iter()
            .filter(|f| !data.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::Halt(format!(
                "Missing required fields for conduct action: {}",
                missing.join(", ")
            )));
        }
        let unknown: Vec<&str> = data
            .keys()
            .map(String::as_str)
            .filter(|k| !RCA_CREATE_FIELDS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(ToolError::Halt(format!(
                "Unrecognized fields in rca_data: {}",
                unknown.join(", ")
            )));
        }

        let incident_id = data.id_field("incident_id").unwrap_or_default();
        let incident = store
            .get(INCIDENTS, &incident_id)?
            .ok_or_else(|| ToolError::Halt("Incident not found".into()))?;
        if !matches!(incident.str_field("status"), Some("resolved" | "closed")) {
            return Err(ToolError::Halt("Incident status must be one of: resolved, closed".into()));
        }
        if !matches!(incident.str_field("severity"), Some("P1" | "P2")) {
            return Err(ToolError::Halt("Incident severity must be one of: P1, P2".into()));
        }
        let assigned_to = data.id_field("assigned_to").unwrap_or_default();
        active_rca_user(store, "assigned_to", &assigned_to)?;
        let title = data.str_field("rca_title").unwrap_or_default();
        if title.trim().is_empty() {
            return Err(ToolError::Halt("rca_title cannot be empty".into()));
        }
        check_rca_enums(&data)?;

        let rca_id = next_numeric_id(store.table(ROOT_CAUSE_ANALYSES)?);
        let number = number_for("RCA", &rca_id, 7);
        let now = store.now();
        let rca = json!({
            "rca_id": rca_id,
            "rca_number": number,
            "rca_title": title,
            "incident_id": incident_id,
            "assigned_to": assigned_to,
            "analysis_method": data.get("analysis_method").map_or(Value::Null, text_or_null),
            "root_cause_summary": data.get("root_cause_summary").cloned().unwrap_or(Value::Null),
            "status": data.str_field("status").unwrap_or("assigned"),
            "due_date": data.get("due_date"),
            "completed_at": null,
            "approved_by": null,
            "created_at": now,
            "updated_at": now
        });
        store.insert(ROOT_CAUSE_ANALYSES, &rca_id, rca.as_object().cloned().unwrap_or_default())?;
        info!(rca_id = %rca_id, incident_id = %incident_id, "Root cause analysis opened");
        Ok(json!({
            "success": true,
            "action": "conduct",
            "rca_id": rca_id,
            "message": format!("RCA {rca_id} created successfully"),
            "rca_data": rca
        }))
    }

    fn update(&self, store: &mut Store, rca_id: &str, data: Map<String, Value>) -> Result<Value, ToolError> {
        if !RCA_UPDATE_FIELDS.iter().any(|f| data.contains_key(*f)) {
            return Err(ToolError::InvalidArgs(format!(
                "At least one optional field must be provided for updates {}",
                RCA_UPDATE_FIELDS.join(", ")
            )));
        }
        let unknown: Vec<&str> = data
            .keys()
            .map(String::as_str)
            .filter(|k| !RCA_UPDATE_FIELDS.contains(k))
            .collect();
        if !unknown.is_empty() {
            return Err(ToolError::InvalidArgs(format!(
                "Invalid fields for RCA updating: {}",
                unknown.join(", ")
            )));
        }
        if data.contains_key("rca_title") && data.str_field("rca_title").map_or(true, |t| t.trim().is_empty()) {
            return Err(ToolError::Halt("rca_title cannot be empty".into()));
        }
        if let Some(assigned_to) = data.id_field("assigned_to") {
            active_rca_user(store, "assigned_to", &assigned_to)?;
        }
        check_rca_enums(&data)?;
        let approved_by = data.id_field("approved_by").filter(|a| !a.is_empty());
        if let Some(approver) = approved_by.as_deref() {
            active_rca_user(store, "approved_by", approver)?;
        }
        if data.str_field("status") == Some("approved") && approved_by.is_none() {
            return Err(ToolError::Halt("approved_by is required when status is approved".into()));
        }

        let now = store.now();
        let rca = store
            .get_mut(ROOT_CAUSE_ANALYSES, rca_id)?
            .ok_or_else(|| ToolError::Halt("RCA not found".into()))?;
        for (key, value) in data {
            let value = match key.as_str() {
                "analysis_method" | "root_cause_summary" | "completed_at" | "approved_by" => text_or_null(&value),
                _ => value,
            };
            rca.insert(key, value);
        }
        rca.insert("updated_at".into(), json!(now));
        info!(rca_id = %rca_id, "Root cause analysis updated");
        Ok(json!({
            "success": true,
            "action": "update",
            "rca_id": rca_id,
            "message": format!("RCA {rca_id} updated successfully"),
            "rca_data": rca.clone()
        }))
    }
}

impl Tool for ManageRootCauseAnalysesTool {
    fn name(&self) -> &str {
        "manage_root_cause_analyses"
    }

    fn description(&self) -> &str {
        "Open (action create or conduct) or update a root cause analysis. Only resolved or closed \
         P1/P2 incidents qualify, and approving requires an active approved_by user."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "conduct", "update"]},
                "rca_id": {"type": "string", "description": "Required for update."},
                "rca_data": {
                    "type": "object",
                    "properties": {
                        "incident_id": {"type": "string"},
                        "rca_title": {"type": "string"},
                        "assigned_to": {"type": "string"},
                        "analysis_method": {"type": "string", "enum": ANALYSIS_METHODS},
                        "root_cause_summary": {"type": "string"},
                        "status": {"type": "string", "enum": RCA_STATUSES},
                        "due_date": {"type": "string"},
                        "completed_at": {"type": "string"},
                        "approved_by": {"type": "string"}
                    }
                }
            },
            "required": ["action", "rca_data"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[ROOT_CAUSE_ANALYSES, INCIDENTS, USERS])?;
        let args: ManageRcaArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &["conduct"])?;
        let data = args.rca_data.filter(|d| !d.is_empty());
        match action {
            Action::Create => {
                let data = data
                    .ok_or_else(|| ToolError::InvalidArgs("rca_data is required for conduct action".into()))?;
                self.conduct(store, data)
            }
            Action::Update => {
                let rca_id = args
                    .rca_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ToolError::Halt("rca_id is required for update action".into()))?;
                if !store.contains(ROOT_CAUSE_ANALYSES, &rca_id)? {
                    return Err(ToolError::Halt("RCA not found".into()));
                }
                let data = data
                    .ok_or_else(|| ToolError::InvalidArgs("rca_data is required for update action".into()))?;
                self.update(store, &rca_id, data)
            }
        }
    }
}

#[derive(Deserialize)]
struct ManageReviewArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    review_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    incident_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    reviewer_id: Option<String>,
    review_type: Option<String>,
    review_findings: Option<String>,
    impact_assessment: Option<String>,
    root_causes: Option<Vec<Value>>,
    lessons_learned: Option<String>,
    recommendations: Option<String>,
    action_items: Option<Vec<Value>>,
    review_status: Option<String>,
}

fn trimmed(value: Option<&String>) -> Value {
    match value.map(|s| s.trim()) {
        Some(s) if !s.is_empty() => json!(s),
        _ => Value::Null,
    }
}

pub struct ManagePostIncidentReviewsTool;

impl ManagePostIncidentReviewsTool {
    fn create(&self, store: &mut Store, args: ManageReviewArgs) -> Result<Value, ToolError> {
        let (Some(incident_id), Some(reviewer_id), Some(review_type), Some(findings)) = (
            args.incident_id.filter(|s| !s.is_empty()),
            args.reviewer_id.filter(|s| !s.is_empty()),
            args.review_type.filter(|s| !s.is_empty()),
            args.review_findings.as_ref().filter(|s| !s.is_empty()),
        ) else {
            return Err(ToolError::InvalidArgs(
                "incident_id, reviewer_id, review_type, and review_findings are required for create action".into(),
            ));
        };
        lookup::ensure(store, INCIDENTS, &incident_id, "Incident")?;
        super::active_user(store, &reviewer_id)?;
        one_of("review_type", &review_type, REVIEW_TYPES)?;
        if findings.trim().is_empty() {
            return Err(ToolError::InvalidArgs("review_findings cannot be empty".into()));
        }

        let review_id = next_numeric_id(store.table(POST_INCIDENT_REVIEWS)?);
        let number = number_for("PIR", &review_id, 8);
        let now = store.now();
        let review = json!({
            "review_id": review_id,
            "review_number": number,
            "incident_id": incident_id,
            "reviewer_id": reviewer_id,
            "review_type": review_type,
            "review_findings": findings,
            "impact_assessment": trimmed(args.impact_assessment.as_ref()),
            "root_causes": args.root_causes.unwrap_or_default(),
            "lessons_learned": trimmed(args.lessons_learned.as_ref()),
            "recommendations": trimmed(args.recommendations.as_ref()),
            "action_items": args.action_items.unwrap_or_default(),
            "review_status": "Draft",
            "created_at": now,
            "updated_at": now,
            "last_modified_by": reviewer_id,
            "version": 1,
            "contributors": [reviewer_id]
        });
        store.insert(POST_INCIDENT_REVIEWS, &review_id, review.as_object().cloned().unwrap_or_default())?;
        info!(review_id = %review_id, incident_id = %incident_id, "Post-incident review created");
        Ok(json!({
            "success": true,
            "action": "create",
            "review_id": review_id,
            "review_number": number,
            "review_data": review
        }))
    }

    fn update(&self, store: &mut Store, args: ManageReviewArgs) -> Result<Value, ToolError> {
        let review_id = args
            .review_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("review_id is required for update action".into()))?;
        lookup::ensure(store, POST_INCIDENT_REVIEWS, &review_id, "Review")?;
        let nothing_to_change = args.review_type.is_none()
            && args.review_findings.is_none()
            && args.impact_assessment.is_none()
            && args.root_causes.is_none()
            && args.lessons_learned.is_none()
            && args.recommendations.is_none()
            && args.action_items.is_none()
            && args.review_status.is_none();
        if nothing_to_change {
            return Err(ToolError::InvalidArgs("At least one field must be provided for update".into()));
        }
        if let Some(reviewer_id) = args.reviewer_id.as_deref() {
            super::active_user(store, reviewer_id)?;
        }
        if let Some(review_type) = args.review_type.as_deref() {
            one_of("review_type", review_type, REVIEW_TYPES)?;
        }
        if let Some(status) = args.review_status.as_deref() {
            one_of("review_status", status, REVIEW_STATUSES)?;
        }
        if args.review_findings.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(ToolError::InvalidArgs("review_findings cannot be empty".into()));
        }

        let now = store.now();
        let review = lookup::record_mut(store, POST_INCIDENT_REVIEWS, &review_id, "Review")?;
        if let Some(review_type) = args.review_type {
            review.insert("review_type".into(), json!(review_type));
        }
        if let Some(findings) = args.review_findings {
            review.insert("review_findings".into(), json!(findings.trim()));
            let version = review.get("version").and_then(Value::as_u64).unwrap_or(1) + 1;
            review.insert("version".into(), json!(version));
        }
        for (field, value) in [
            ("impact_assessment", args.impact_assessment),
            ("lessons_learned", args.lessons_learned),
            ("recommendations", args.recommendations),
        ] {
            if let Some(value) = value {
                review.insert(field.into(), json!(value.trim()));
            }
        }
        if let Some(root_causes) = args.root_causes {
            review.insert("root_causes".into(), json!(root_causes));
        }
        if let Some(action_items) = args.action_items {
            review.insert("action_items".into(), json!(action_items));
        }
        if let Some(status) = args.review_status {
            review.insert("review_status".into(), json!(status));
        }
        if let Some(reviewer_id) = args.reviewer_id {
            review.insert("last_modified_by".into(), json!(reviewer_id));
            let contributors = review
                .entry("contributors")
                .or_insert_with(|| json!([]));
            if let Some(list) = contributors.as_array_mut() {
                if !list.iter().any(|c| c.as_str() == Some(reviewer_id.as_str())) {
                    list.push(json!(reviewer_id));
                }
            }
        }
        review.insert("updated_at".into(), json!(now));
        let number = review.get("review_number").cloned();
        let review = review.clone();
        info!(review_id = %review_id, "Post-incident review updated");
        Ok(json!({
            "success": true,
            "action": "update",
            "review_id": review_id,
            "review_number": number,
            "review_data": review
        }))
    }
}

impl Tool for ManagePostIncidentReviewsTool {
    fn name(&self) -> &str {
        "manage_post_incident_reviews"
    }

    fn description(&self) -> &str {
        "Create or update post-incident reviews. Reviews start as Draft; editing findings bumps \
         the version and every updating reviewer joins the contributors."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "review_id": {"type": "string", "description": "Required for update."},
                "incident_id": {"type": "string"},
                "reviewer_id": {"type": "string", "description": "Active user."},
                "review_type": {"type": "string", "enum": REVIEW_TYPES},
                "review_findings": {"type": "string"},
                "impact_assessment": {"type": "string"},
                "root_causes": {"type": "array", "items": {}},
                "lessons_learned": {"type": "string"},
                "recommendations": {"type": "string"},
                "action_items": {"type": "array", "items": {}},
                "review_status": {"type": "string", "enum": REVIEW_STATUSES}
            },
            "required": ["action"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[POST_INCIDENT_REVIEWS, INCIDENTS, USERS])?;
        let args: ManageReviewArgs = args::parse(args)?;
        match Action::parse(args.action.as_deref(), &[])? {
            Action::Create => self.create(store, args),
            Action::Update => self.update(store, args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::fixtures;

    fn rca(store: &mut Store) -> Value {
        ManageRootCauseAnalysesTool
            .invoke(
                store,
                json!({"action": "conduct", "rca_data": {
                    "incident_id": "1", "rca_title": "Billing DB failover", "assigned_to": "1",
                    "due_date": "2025-12-01", "analysis_method": "5_whys"
                }}),
            )
            .expect("rca")
    }

    #[test]
    fn rca_opens_on_resolved_major_incident() {
        let mut store = fixtures::store();
        let out = rca(&mut store);
        assert_eq!(out["rca_data"]["rca_number"], "RCA0000001");
        assert_eq!(out["rca_data"]["status"], "assigned");
        assert_eq!(out["message"], "RCA 1 created successfully");
    }

    #[test]
    fn rca_rejects_open_incident_and_unknown_fields() {
        let mut store = fixtures::store();
        let err = ManageRootCauseAnalysesTool
            .invoke(
                &mut store,
                json!({"action": "create", "rca_data": {"incident_id": "2", "rca_title": "x",
                       "assigned_to": "1", "due_date": "2025-12-01"}}),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: Incident status must be one of: resolved, closed");

        let err = ManageRootCauseAnalysesTool
            .invoke(
                &mut store,
                json!({"action": "conduct", "rca_data": {"incident_id": "1", "rca_title": "x",
                       "assigned_to": "1", "due_date": "2025-12-01", "owner": "2"}}),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: Unrecognized fields in rca_data: owner");
    }

    #[test]
    fn approving_rca_needs_approver() {
        let mut store = fixtures::store();
        rca(&mut store);
        let err = ManageRootCauseAnalysesTool
            .invoke(&mut store, json!({"action": "update", "rca_id": "1", "rca_data": {"status": "approved"}}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: approved_by is required when status is approved");

        let out = ManageRootCauseAnalysesTool
            .invoke(
                &mut store,
                json!({"action": "update", "rca_id": 1, "rca_data": {"status": "approved", "approved_by": 3,
                       "root_cause_summary": ""}}),
            )
            .expect("approved");
        assert_eq!(out["rca_data"]["approved_by"], "3");
        assert!(out["rca_data"]["root_cause_summary"].is_null());
    }

    #[test]
    fn review_lifecycle_tracks_contributors() {
        let mut store = fixtures::store();
        let out = ManagePostIncidentReviewsTool
            .invoke(
                &mut store,
                json!({"action": "create", "incident_id": "1", "reviewer_id": "1",
                       "review_type": "Preliminary", "review_findings": "Failover lagged",
                       "lessons_learned": "  test failover  "}),
            )
            .expect("review");
        assert_eq!(out["review_number"], "PIR00000001");
        assert_eq!(out["review_data"]["lessons_learned"], "test failover");
        assert_eq!(out["review_data"]["review_status"], "Draft");

        let out = ManagePostIncidentReviewsTool
            .invoke(
                &mut store,
                json!({"action": "update", "review_id": "1", "reviewer_id": "3",
                       "review_findings": "Failover lagged by 40m", "review_status": "In_Review"}),
            )
            .expect("updated");
        assert_eq!(out["review_data"]["version"], 2);
        assert_eq!(out["review_data"]["contributors"], json!(["1", "3"]));
        assert_eq!(out["review_data"]["review_status"], "In_Review");
    }

    #[test]
    fn review_type_is_checked() {
        let mut store = fixtures::store();
        let err = ManagePostIncidentReviewsTool
            .invoke(
                &mut store,
                json!({"action": "create", "incident_id": "1", "reviewer_id": "1",
                       "review_type": "Quick", "review_findings": "x"}),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid review_type. Must be one of: Preliminary, Detailed, Final");
    }
}
