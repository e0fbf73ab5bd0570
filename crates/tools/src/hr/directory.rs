//! Read-mostly HR reference data: assets, departments, benefit plans.

use super::{BENEFIT_PLANS, DEPARTMENTS, EMPLOYEES, EMPLOYEE_ASSETS};
use crate::args::{self, opt_id};
use crate::validate::{self, contains_ci, prefix_match};
use crate::{Tool, ToolError};
use opsdesk_core::record::round2;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const ASSET_STATUSES: &[&str] = &["returned", "missing", "damaged", "assigned"];
const DEPARTMENT_STATUSES: &[&str] = &["active", "inactive"];
const PLAN_STATUSES: &[&str] = &["active", "inactive"];
const ENROLLMENT_WINDOWS: &[&str] = &["open", "closed"];

#[derive(Deserialize)]
struct GetAssetsArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    status: Option<String>,
    email: Option<String>,
}

pub struct GetAssetsTool;

impl Tool for GetAssetsTool {
    fn name(&self) -> &str {
        "get_assets"
    }

    fn description(&self) -> &str {
        "List employee assets by employee (ID or email) and status, with a per-status summary."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "status": {"type": "string", "enum": ASSET_STATUSES},
                "email": {"type": "string"}
            },
            "required": []
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[EMPLOYEES, EMPLOYEE_ASSETS])?;
        let args: GetAssetsArgs = args::parse(args)?;
        if let Some(id) = args.employee_id.as_deref() {
            if !store.contains(EMPLOYEES, id)? {
                return Err(ToolError::Halt("Employee not found".into()));
            }
        }
        let email_match = match args.email.as_deref() {
            Some(email) => Some(
                store
                    .records(EMPLOYEES)?
                    .find(|(_, e)| e.str_field("email") == Some(email))
                    .map(|(id, _)| id.clone())
                    .ok_or_else(|| ToolError::Halt("Employee with email not found".into()))?,
            ),
            None => None,
        };
        if let Some(status) = args.status.as_deref() {
            if !ASSET_STATUSES.contains(&status) {
                return Err(ToolError::Halt(format!(
                    "Invalid asset status - status must be one of: {}",
                    ASSET_STATUSES.join(", ")
                )));
            }
        }
        let owner = args.employee_id.or(email_match);

        let mut by_status = Map::new();
        let mut assets = Vec::new();
        for (asset_id, asset) in store.records(EMPLOYEE_ASSETS)? {
            if owner.as_deref().is_some_and(|o| !asset.refers_to("employee_id", o)) {
                continue;
            }
            if args.status.as_deref().is_some_and(|s| !asset.is("status", s)) {
                continue;
            }
            let mut row = asset.clone();
            row.insert("asset_id".into(), json!(asset_id));
            if let Some(employee) = asset
                .id_field("employee_id")
                .and_then(|id| store.get(EMPLOYEES, &id).ok().flatten())
            {
                row.insert("employee_name".into(), json!(employee.get("full_name")));
                row.insert("employee_email".into(), json!(employee.get("email")));
            }
            let status = asset.str_or("status", "unknown").to_string();
            let count = by_status.get(&status).and_then(Value::as_u64).unwrap_or(0);
            by_status.insert(status, json!(count + 1));
            assets.push(Value::Object(row));
        }

        let mut summary = json!({"total_assets": assets.len(), "by_status": by_status});
        if let Some(owner) = owner {
            let employee = store.get(EMPLOYEES, &owner)?;
            summary["employee_info"] = json!({
                "employee_id": owner,
                "employee_name": employee.and_then(|e| e.get("full_name")),
                "employee_email": employee.and_then(|e| e.get("email")),
                "employee_status": employee.and_then(|e| e.get("status"))
            });
        }
        Ok(json!({"success": true, "summary": summary, "assets": assets}))
    }
}

#[derive(Deserialize)]
struct GetDepartmentArgs {
    #[serde(default, deserialize_with = "opt_id")]
    department_id: Option<String>,
    name: Option<String>,
    status: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    head_of_department_id: Option<String>,
    created_at: Option<String>,
    last_updated: Option<String>,
}

pub struct GetDepartmentTool;

impl Tool for GetDepartmentTool {
    fn name(&self) -> &str {
        "get_department"
    }

    fn description(&self) -> &str {
        "Find departments by ID, partial name (case-insensitive), status, head or date prefix."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "department_id": {"type": "string"},
                "name": {"type": "string"},
                "status": {"type": "string", "enum": DEPARTMENT_STATUSES},
                "head_of_department_id": {"type": "string"},
                "created_at": {"type": "string"},
                "last_updated": {"type": "string"}
            },
            "required": []
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[DEPARTMENTS])?;
        let args: GetDepartmentArgs = args::parse(args)?;
        validate::opt_one_of("status", args.status.as_deref(), DEPARTMENT_STATUSES)?;
        let name = args.name.as_deref().map(contains_ci).transpose()?;

        let departments: Vec<Value> = store
            .records(DEPARTMENTS)?
            .filter(|(_, d)| {
                args.department_id.as_deref().map_or(true, |id| d.refers_to("department_id", id))
                    && args
                        .head_of_department_id
                        .as_deref()
                        .map_or(true, |id| d.refers_to("head_of_department_id", id))
                    && args.status.as_deref().map_or(true, |s| d.is("status", s))
            })
            .filter(|(_, d)| {
                name.as_ref()
                    .map_or(true, |re| d.str_field("name").is_some_and(|n| re.is_match(n)))
            })
            .filter(|(_, d)| {
                args.created_at.as_deref().map_or(true, |p| prefix_match(d.str_field("created_at"), p))
                    && args
                        .last_updated
                        .as_deref()
                        .map_or(true, |p| prefix_match(d.str_field("last_updated"), p))
            })
            .map(|(_, d)| Value::Object(d.clone()))
            .collect();

        Ok(json!({"success": true, "departments": departments}))
    }
}

#[derive(Deserialize)]
struct UpdateBenefitPlanArgs {
    #[serde(default, deserialize_with = "opt_id")]
    plan_id: Option<String>,
    name: Option<String>,
    status: Option<String>,
    current_cost: Option<f64>,
    previous_year_cost: Option<f64>,
    enrollment_window: Option<String>,
}

/// Percent change from last year's cost; `None` without a positive baseline.
fn cost_variance_percent(current: f64, previous: f64) -> Option<f64> {
    (previous > 0.0).then(|| round2((current - previous) / previous * 100.0))
}

fn plan_failure(reason: &str) -> ToolError {
    ToolError::Halt(format!("Benefit plan operation failed - {reason}"))
}

pub struct UpdateBenefitPlanTool;

impl Tool for UpdateBenefitPlanTool {
    fn name(&self) -> &str {
        "update_benefit_plan"
    }

    fn description(&self) -> &str {
        "Update a benefit plan. Cost changes recompute cost_variance_percent against the previous year."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan_id": {"type": "string"},
                "name": {"type": "string", "description": "Must be unique across plans."},
                "status": {"type": "string", "enum": PLAN_STATUSES},
                "current_cost": {"type": "number", "minimum": 0},
                "previous_year_cost": {"type": "number", "minimum": 0},
                "enrollment_window": {"type": "string", "enum": ENROLLMENT_WINDOWS}
            },
            "required": ["plan_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[BENEFIT_PLANS])?;
        let args: UpdateBenefitPlanArgs = args::parse(args)?;
        let plan_id = args
            .plan_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("Missing required parameter: plan_id".into()))?;
        if !store.contains(BENEFIT_PLANS, &plan_id)? {
            return Err(ToolError::Halt("Benefit plan not found".into()));
        }
        if args.name.is_none()
            && args.status.is_none()
            && args.current_cost.is_none()
            && args.previous_year_cost.is_none()
            && args.enrollment_window.is_none()
        {
            return Err(ToolError::InvalidArgs(
                "At least one optional parameter (name, status, current_cost, previous_year_cost, \
                 enrollment_window) must be provided for updates"
                    .into(),
            ));
        }
        if args.status.as_deref().is_some_and(|s| !PLAN_STATUSES.contains(&s)) {
            return Err(plan_failure(&format!("status must be one of: {}", PLAN_STATUSES.join(", "))));
        }
        if args.enrollment_window.as_deref().is_some_and(|w| !ENROLLMENT_WINDOWS.contains(&w)) {
            return Err(plan_failure(&format!(
                "enrollment_window must be one of: {}",
                ENROLLMENT_WINDOWS.join(", ")
            )));
        }
        if args.current_cost.is_some_and(|c| c < 0.0) {
            return Err(plan_failure("current_cost must be non-negative"));
        }
        if args.previous_year_cost.is_some_and(|c| c < 0.0) {
            return Err(plan_failure("previous_year_cost must be non-negative"));
        }
        if let Some(name) = args.name.as_deref() {
            let taken = store
                .records(BENEFIT_PLANS)?
                .any(|(id, p)| id != &plan_id && p.is("name", name));
            if taken {
                return Err(ToolError::Halt(format!("Benefit plan with name '{name}' already exists")));
            }
        }

        let now = store.now();
        let plan = store
            .get_mut(BENEFIT_PLANS, &plan_id)?
            .ok_or_else(|| ToolError::Halt("Benefit plan not found".into()))?;
        if let Some(name) = args.name {
            plan.insert("name".into(), json!(name));
        }
        if let Some(status) = args.status {
            plan.insert("status".into(), json!(status));
        }
        if let Some(cost) = args.current_cost {
            plan.insert("current_cost".into(), json!(cost));
        }
        if let Some(cost) = args.previous_year_cost {
            plan.insert("previous_year_cost".into(), json!(cost));
        }
        if let Some(window) = args.enrollment_window {
            plan.insert("enrollment_window".into(), json!(window));
        }
        if let (Some(current), Some(previous)) = (plan.f64_field("current_cost"), plan.f64_field("previous_year_cost")) {
            if let Some(variance) = cost_variance_percent(current, previous) {
                plan.insert("cost_variance_percent".into(), json!(variance));
            }
        }
        plan.insert("last_updated".into(), json!(now));
        info!(plan_id = %plan_id, "Benefit plan updated");
        Ok(Value::Object(plan.clone()))
    }
}
