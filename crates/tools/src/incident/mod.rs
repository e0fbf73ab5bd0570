//! Incident management: incidents, notes, approvals, reviews, users, clients, audit, SLAs.

pub mod approvals;
pub mod audit_trail;
pub mod clients;
pub mod incidents;
pub mod reviews;
pub mod sla;
pub mod users;

use crate::{Tool, ToolError};
use opsdesk_core::{Record, RecordExt, Store};
use std::sync::Arc;

pub(crate) const INCIDENTS: &str = "incidents";
pub(crate) const CLIENTS: &str = "clients";
pub(crate) const CONFIGURATION_ITEMS: &str = "configuration_items";
pub(crate) const USERS: &str = "users";
pub(crate) const VENDORS: &str = "vendors";
pub(crate) const PROBLEM_TICKETS: &str = "problem_tickets";
pub(crate) const WORK_NOTES: &str = "work_notes";
pub(crate) const APPROVAL_REQUESTS: &str = "approval_requests";
pub(crate) const ROOT_CAUSE_ANALYSES: &str = "root_cause_analyses";
pub(crate) const POST_INCIDENT_REVIEWS: &str = "post_incident_reviews";
pub(crate) const AUDIT_TRAILS: &str = "audit_trails";
pub(crate) const SLA_AGREEMENTS: &str = "sla_agreements";
pub(crate) const INCIDENT_CONFIGURATION_ITEMS: &str = "incident_configuration_items";
pub(crate) const CI_CLIENT_ASSIGNMENTS: &str = "ci_client_assignments";

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(incidents::ManageIncidentsTool),
        Arc::new(incidents::ManageWorkNotesTool),
        Arc::new(approvals::ManageApprovalRequestsTool),
        Arc::new(reviews::ManageRootCauseAnalysesTool),
        Arc::new(reviews::ManagePostIncidentReviewsTool),
        Arc::new(users::ManageUsersTool),
        Arc::new(clients::ManageClientsTool),
        Arc::new(clients::ManageSlaAgreementsTool),
        Arc::new(audit_trail::LogAuditRecordsTool),
        Arc::new(sla::GetSlaBreachIncidentsTool),
    ]
}

/// User that exists and is `active`.
pub(crate) fn active_user<'a>(store: &'a Store, user_id: &str) -> Result<&'a Record, ToolError> {
    let user = store
        .get(USERS, user_id)?
        .ok_or_else(|| ToolError::NotFound(format!("User with ID {user_id} not found")))?;
    if !user.is("status", "active") {
        return Err(ToolError::Rejected(format!("User with ID {user_id} is not active")));
    }
    Ok(user)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use opsdesk_core::Store;
    use serde_json::json;

    /// One premium client, one CI, two incidents (one resolved late), three users.
    pub fn store() -> Store {
        Store::from_value(json!({
            "clients": {
                "1": {"client_id": "1", "client_name": "Northwind", "status": "active"}
            },
            "vendors": {
                "1": {"vendor_id": "1", "vendor_name": "CloudCo", "status": "active"}
            },
            "configuration_items": {
                "1": {"ci_id": "1", "ci_name": "billing-db", "ci_type": "database"}
            },
            "users": {
                "1": {"user_id": "1", "first_name": "Ada", "last_name": "Kent", "email": "ada@ops.test",
                      "role": "incident_manager", "timezone": "UTC", "status": "active"},
                "2": {"user_id": "2", "first_name": "Bo", "last_name": "Ruiz", "email": "bo@ops.test",
                      "role": "technical_support", "timezone": "UTC", "status": "inactive"},
                "3": {"user_id": "3", "first_name": "Cy", "last_name": "Moss", "email": "cy@ops.test",
                      "role": "executive", "timezone": "UTC", "status": "active"}
            },
            "problem_tickets": {
                "1": {"problem_id": "1", "problem_number": "PRB0000001", "status": "open"}
            },
            "incidents": {
                "1": {"incident_id": "1", "incident_number": "INC0000001", "title": "Billing outage",
                      "client_id": "1", "affected_ci_id": "1", "severity": "P1", "impact": "critical",
                      "urgency": "critical", "status": "resolved", "reported_by": "1",
                      "detection_time": "2025-09-01T08:00:00", "resolved_at": "2025-09-01T14:00:00"},
                "2": {"incident_id": "2", "incident_number": "INC0000002", "title": "Slow reports",
                      "client_id": "1", "affected_ci_id": "1", "severity": "P3", "impact": "low",
                      "urgency": "low", "status": "open", "reported_by": "1",
                      "detection_time": "2025-09-03T10:00:00"}
            },
            "sla_agreements": {
                "1": {"sla_id": "1", "client_id": "1", "tier": "premium", "status": "active"}
            },
            "incident_configuration_items": {
                "1": {"incident_id": "1", "ci_id": "1"},
                "2": {"incident_id": "2", "ci_id": "1"}
            },
            "ci_client_assignments": {
                "1": {"ci_id": "1", "client_id": "1", "assignment_type": "primary"}
            },
            "work_notes": {},
            "approval_requests": {},
            "root_cause_analyses": {},
            "post_incident_reviews": {},
            "audit_trails": {}
        }))
        .expect("fixture store")
    }
}
