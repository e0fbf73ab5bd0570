//! Resolution SLA breach detection.

use super::{CI_CLIENT_ASSIGNMENTS, INCIDENTS, INCIDENT_CONFIGURATION_ITEMS, SLA_AGREEMENTS};
use crate::args::{self, opt_id};
use crate::validate;
use crate::{Tool, ToolError};
use chrono::{DateTime, NaiveDateTime, NaiveTime};
use opsdesk_core::clock::parse_timestamp;
use opsdesk_core::record::round2;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

/// Agreement tiers with a resolution target matrix.
pub const SLA_TIERS: &[&str] = &["premium", "standard", "basic"];

/// Maximum minutes from detection to resolution for a tier and severity.
pub fn resolution_target(tier: &str, severity: &str) -> Option<u32> {
    let minutes = match (tier, severity) {
        ("premium", "P1") => 240,
        ("premium", "P2") => 1440,
        ("premium", "P3") => 4320,
        ("premium", "P4") => 7680,
        ("standard", "P1") => 1440,
        ("standard", "P2") => 2880,
        ("standard", "P3") => 7200,
        ("standard", "P4") => 10080,
        ("basic", "P1") => 2880,
        ("basic", "P2") => 7200,
        ("basic", "P3") => 14400,
        ("basic", "P4") => 20160,
        _ => return None,
    };
    Some(minutes)
}

/// Naive timestamp, or an RFC 3339 instant normalised to UTC.
fn parse_instant(value: &str) -> Option<NaiveDateTime> {
    parse_timestamp(value).or_else(|| DateTime::parse_from_rfc3339(value.trim()).ok().map(|dt| dt.naive_utc()))
}

/// Client of an incident through its configuration items; a `primary` assignment wins.
fn incident_client(store: &Store, incident_id: &str) -> Result<Option<String>, ToolError> {
    let ci_ids: Vec<String> = store
        .records(INCIDENT_CONFIGURATION_ITEMS)?
        .filter(|(_, link)| link.refers_to("incident_id", incident_id))
        .filter_map(|(_, link)| link.id_field("ci_id"))
        .collect();
    let assignments: Vec<_> = store
        .records(CI_CLIENT_ASSIGNMENTS)?
        .map(|(_, a)| a)
        .filter(|a| a.id_field("ci_id").is_some_and(|ci| ci_ids.contains(&ci)))
        .collect();
    let chosen = assignments
        .iter()
        .find(|a| a.is("assignment_type", "primary"))
        .or_else(|| assignments.first());
    Ok(chosen.and_then(|a| a.id_field("client_id")))
}

fn active_tier(store: &Store, client_id: &str) -> Result<Option<String>, ToolError> {
    Ok(store
        .records(SLA_AGREEMENTS)?
        .map(|(_, sla)| sla)
        .find(|sla| sla.refers_to("client_id", client_id) && sla.is("status", "active"))
        .and_then(|sla| sla.str_field("tier").map(str::to_string)))
}

#[derive(Deserialize)]
struct SlaBreachArgs {
    #[serde(default, deserialize_with = "opt_id")]
    client_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    status: Option<String>,
}

#[derive(Default)]
struct ScanCounts {
    checked: usize,
    with_resolution: usize,
    with_client: usize,
    with_sla: usize,
}

pub struct GetSlaBreachIncidentsTool;

impl Tool for GetSlaBreachIncidentsTool {
    fn name(&self) -> &str {
        "get_sla_breach_incidents"
    }

    fn description(&self) -> &str {
        "List resolved or closed incidents whose detection-to-resolution time exceeded the \
         resolution SLA of their client's active agreement tier."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "client_id": {"type": "string"},
                "start_date": {"type": "string", "description": "YYYY-MM-DD, on detection time"},
                "end_date": {"type": "string", "description": "YYYY-MM-DD, inclusive"},
                "status": {"type": "string"}
            },
            "required": []
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[INCIDENTS, SLA_AGREEMENTS, INCIDENT_CONFIGURATION_ITEMS, CI_CLIENT_ASSIGNMENTS])?;
        let args: SlaBreachArgs = args::parse(args)?;
        let start = args
            .start_date
            .as_deref()
            .map(|d| validate::date("start_date", d))
            .transpose()?
            .map(|d| d.and_time(NaiveTime::MIN));
        let end = args
            .end_date
            .as_deref()
            .map(|d| validate::date("end_date", d))
            .transpose()?
            .and_then(|d| d.succ_opt())
            .map(|d| d.and_time(NaiveTime::MIN));

        let mut counts = ScanCounts::default();
        let mut breaches = Vec::new();
        for (incident_id, incident) in store.records(INCIDENTS)? {
            counts.checked += 1;
            let Some(resolved_raw) = ["resolved_at", "closed_at"]
                .iter()
                .find_map(|f| incident.str_field(f).filter(|s| !s.is_empty()))
            else {
                continue;
            };
            counts.with_resolution += 1;
            if args.status.as_deref().is_some_and(|s| !incident.is("status", s)) {
                continue;
            }
            let Some(detected) = incident.str_field("detection_time").and_then(parse_instant) else {
                debug!(incident_id = %incident_id, "Skipping incident without a usable detection_time");
                continue;
            };
            if start.is_some_and(|s| detected < s) || end.is_some_and(|e| detected >= e) {
                continue;
            }
            let Some(client_id) = incident_client(store, incident_id)? else {
                debug!(incident_id = %incident_id, "No client assignment for incident CIs");
                continue;
            };
            counts.with_client += 1;
            if args.client_id.as_deref().is_some_and(|c| c != client_id) {
                continue;
            }
            let Some(tier) = active_tier(store, &client_id)? else {
                debug!(incident_id = %incident_id, client_id = %client_id, "No active SLA");
                continue;
            };
            counts.with_sla += 1;
            let Some(target) = incident.str_field("severity").and_then(|sev| resolution_target(&tier, sev)) else {
                continue;
            };
            let Some(resolved) = parse_instant(resolved_raw) else {
                debug!(incident_id = %incident_id, "Unparseable resolution timestamp");
                continue;
            };
            let actual = (resolved - detected).num_seconds() as f64 / 60.0;
            if actual > f64::from(target) {
                let mut row = incident.clone();
                row.insert("client_id".into(), json!(client_id));
                row.insert("sla_tier".into(), json!(tier));
                row.insert("expected_resolution_minutes".into(), json!(target));
                row.insert("actual_resolution_minutes".into(), json!(round2(actual)));
                row.insert("breach_by_minutes".into(), json!(round2(actual - f64::from(target))));
                breaches.push(Value::Object(row));
            }
        }

        Ok(json!({
            "success": true,
            "count": breaches.len(),
            "breach_incidents": breaches,
            "summary": {
                "incidents_checked": counts.checked,
                "incidents_with_resolution": counts.with_resolution,
                "incidents_with_client": counts.with_client,
                "incidents_with_sla": counts.with_sla,
                "breaches_found": breaches.len()
            }
        }))
    }
}
