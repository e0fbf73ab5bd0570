use super::calc::{variance_percent, VARIANCE_REVIEW_THRESHOLD};
use super::{EMPLOYEES, PAYROLL_CYCLES, PAYROLL_EARNINGS, PAYROLL_INPUTS};
use crate::args::{self, opt_id};
use crate::validate::{non_negative, one_of, opt_one_of};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Weekly hour ceiling before an overtime violation is flagged.
const MAX_WEEKLY_HOURS: f64 = 60.0;

/// Allowance share of base salary that requires payroll review.
const ALLOWANCE_REVIEW_RATIO: f64 = 0.25;

const INPUT_STATUSES: &[&str] = &["pending", "review"];
const EARNING_TYPES: &[&str] = &["bonus", "incentive", "allowance", "overtime"];
const NEW_EARNING_STATUSES: &[&str] = &["pending", "approved", "require_justification"];
const EARNING_STATUSES: &[&str] = &["pending", "approved", "rejected", "require_justification"];

/// Bonuses above this amount need justification before they can stay pending.
const BONUS_JUSTIFICATION_LIMIT: f64 = 5000.0;

fn flag_employee(store: &mut Store, employee_id: &str, flag: &str) -> Result<(), ToolError> {
    let employee = lookup::record_mut(store, EMPLOYEES, employee_id, "Employee")?;
    employee.insert(flag.into(), json!(true));
    warn!(employee_id, flag, "Employee flagged during payroll input");
    Ok(())
}

#[derive(Deserialize)]
struct CreateInputArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    hours_worked: Option<f64>,
    #[serde(default)]
    overtime_hours: f64,
    #[serde(default)]
    allowance_amount: f64,
}

pub struct CreatePayrollInputTool;

impl Tool for CreatePayrollInputTool {
    fn name(&self) -> &str {
        "create_payroll_input"
    }

    fn description(&self) -> &str {
        "Record hours, overtime and allowance for an employee in an open payroll cycle. \
         Excess hours or a large allowance flag the employee instead of creating the input."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "cycle_id": {"type": "string", "description": "Cycle must be open."},
                "hours_worked": {"type": "number", "minimum": 0},
                "overtime_hours": {"type": "number", "minimum": 0, "default": 0},
                "allowance_amount": {"type": "number", "minimum": 0, "default": 0}
            },
            "required": ["employee_id", "cycle_id", "hours_worked"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[EMPLOYEES, PAYROLL_CYCLES, PAYROLL_INPUTS])?;
        let args: CreateInputArgs = args::parse(args)?;
        let (Some(employee_id), Some(cycle_id)) = (args.employee_id, args.cycle_id) else {
            return Err(ToolError::InvalidArgs(
                "Missing required parameters: employee_id and cycle_id are required".into(),
            ));
        };
        let hours_worked = args.hours_worked.ok_or_else(|| {
            ToolError::InvalidArgs("Missing required parameter: hours_worked is required".into())
        })?;
        if hours_worked < 0.0 || args.overtime_hours < 0.0 || args.allowance_amount < 0.0 {
            return Err(ToolError::InvalidArgs(
                "hours_worked, overtime_hours, and allowance_amount must be non-negative numbers".into(),
            ));
        }

        let base_salary = lookup::record(store, EMPLOYEES, &employee_id, "Employee")?.f64_or_zero("base_salary");
        let cycle = lookup::record(store, PAYROLL_CYCLES, &cycle_id, "Payroll cycle")?;
        if !cycle.is("status", "open") {
            return Err(ToolError::Rejected(
                "Payroll input can only be created for a payroll cycle with status 'open'".into(),
            ));
        }

        if hours_worked + args.overtime_hours > MAX_WEEKLY_HOURS {
            flag_employee(store, &employee_id, "flag_potential_overtime_violation")?;
            return Err(ToolError::Rejected(
                "Total hours (hours_worked + overtime_hours) exceed 60 hours per week. \
                 Employee flag 'flag_potential_overtime_violation' has been set. \
                 Please review before creating payroll input."
                    .into(),
            ));
        }
        if base_salary > 0.0 && args.allowance_amount >= ALLOWANCE_REVIEW_RATIO * base_salary {
            flag_employee(store, &employee_id, "flag_requires_payroll_review")?;
            return Err(ToolError::Rejected(format!(
                "Allowance amount ({}) is >= 25% of base salary ({}). \
                 Employee flag 'flag_requires_payroll_review' has been set. \
                 Please review before creating payroll input.",
                args.allowance_amount, base_salary
            )));
        }

        let input_id = next_numeric_id(store.table(PAYROLL_INPUTS)?);
        let now = store.now();
        let input = json!({
            "input_id": input_id,
            "employee_id": employee_id,
            "cycle_id": cycle_id,
            "hours_worked": hours_worked,
            "overtime_hours": args.overtime_hours,
            "allowance_amount": args.allowance_amount,
            "payroll_variance_percent": null,
            "status": "pending",
            "issue_field": null,
            "created_at": now,
            "last_updated": now
        });
        let record: Record = input.as_object().cloned().unwrap_or_default();
        store.insert(PAYROLL_INPUTS, &input_id, record)?;
        info!(input_id = %input_id, employee_id = %employee_id, "Payroll input created");
        Ok(input)
    }
}

#[derive(Deserialize)]
struct UpdateInputArgs {
    #[serde(default, deserialize_with = "opt_id")]
    input_id: Option<String>,
    hours_worked: Option<f64>,
    overtime_hours: Option<f64>,
    allowance_amount: Option<f64>,
    payroll_variance_percent: Option<f64>,
    status: Option<String>,
    issue_field: Option<String>,
}

pub struct UpdatePayrollInputTool;

impl Tool for UpdatePayrollInputTool {
    fn name(&self) -> &str {
        "update_payroll_input"
    }

    fn description(&self) -> &str {
        "Update a payroll input. A change of more than 1% in hours, overtime and allowance combined moves it to review."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input_id": {"type": "string"},
                "hours_worked": {"type": "number", "minimum": 0},
                "overtime_hours": {"type": "number", "minimum": 0},
                "allowance_amount": {"type": "number", "minimum": 0},
                "payroll_variance_percent": {"type": "number"},
                "status": {"type": "string", "enum": INPUT_STATUSES},
                "issue_field": {"type": "string"}
            },
            "required": ["input_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYROLL_INPUTS])?;
        let args: UpdateInputArgs = args::parse(args)?;
        let input_id = args::required("input_id", args.input_id)?;
        lookup::ensure(store, PAYROLL_INPUTS, &input_id, "Payroll input")?;

        let value_change = args.hours_worked.is_some()
            || args.overtime_hours.is_some()
            || args.allowance_amount.is_some();
        if !value_change
            && args.payroll_variance_percent.is_none()
            && args.status.is_none()
            && args.issue_field.is_none()
        {
            return Err(ToolError::InvalidArgs(
                "No fields provided to update. Provide at least one field".into(),
            ));
        }
        for (field, value) in [
            ("hours_worked", args.hours_worked),
            ("overtime_hours", args.overtime_hours),
            ("allowance_amount", args.allowance_amount),
        ] {
            if let Some(v) = value {
                non_negative(field, v)?;
            }
        }
        opt_one_of("status", args.status.as_deref(), INPUT_STATUSES)?;

        let now = store.now();
        let input = lookup::record_mut(store, PAYROLL_INPUTS, &input_id, "Payroll input")?;
        let old_total = input.f64_or_zero("hours_worked")
            + input.f64_or_zero("overtime_hours")
            + input.f64_or_zero("allowance_amount");
        let new_total = args.hours_worked.unwrap_or(input.f64_or_zero("hours_worked"))
            + args.overtime_hours.unwrap_or(input.f64_or_zero("overtime_hours"))
            + args.allowance_amount.unwrap_or(input.f64_or_zero("allowance_amount"));

        let variance = if value_change {
            variance_percent(old_total, new_total)
        } else {
            None
        };
        let needs_review = variance.is_some_and(|v| v > VARIANCE_REVIEW_THRESHOLD);
        if needs_review {
            input.insert("payroll_variance_percent".into(), json!(variance));
        }

        if let Some(v) = args.hours_worked {
            input.insert("hours_worked".into(), json!(v));
        }
        if let Some(v) = args.overtime_hours {
            input.insert("overtime_hours".into(), json!(v));
        }
        if let Some(v) = args.allowance_amount {
            input.insert("allowance_amount".into(), json!(v));
        }
        if let Some(v) = args.payroll_variance_percent {
            input.insert("payroll_variance_percent".into(), json!(v));
        }
        if needs_review {
            input.insert("status".into(), json!("review"));
            input.insert("issue_field".into(), json!("variance exceeds 1%"));
        } else {
            if let Some(status) = args.status {
                input.insert("status".into(), json!(status));
            }
            if let Some(issue) = args.issue_field {
                input.insert("issue_field".into(), json!(issue));
            }
        }
        input.insert("last_updated".into(), json!(now));

        if needs_review {
            info!(input_id = %input_id, "Payroll input moved to review on variance");
        }
        Ok(Value::Object(input.clone()))
    }
}

/// Status a bonus ends up with once the justification rule is applied.
///
/// A bonus above the limit moves from `pending` to `require_justification`, and
/// cannot be approved unless justification notes are on record.
fn bonus_status(earning_type: &str, amount: Option<f64>, status: String, justified: bool) -> Result<String, ToolError> {
    if earning_type != "bonus" || !amount.is_some_and(|a| a > BONUS_JUSTIFICATION_LIMIT) {
        return Ok(status);
    }
    match status.as_str() {
        "pending" => Ok("require_justification".to_string()),
        "approved" if !justified => Err(ToolError::Rejected(format!(
            "Bonus amounts above {BONUS_JUSTIFICATION_LIMIT} require justification_notes before approval"
        ))),
        _ => Ok(status),
    }
}

/// At most one approved earning per employee, cycle and type.
fn ensure_single_approval(
    store: &Store,
    earning_id: Option<&str>,
    employee_id: &str,
    cycle_id: &str,
    earning_type: &str,
) -> Result<(), ToolError> {
    let conflict = store.records(PAYROLL_EARNINGS)?.find(|(other_id, other)| {
        earning_id != Some(other_id.as_str())
            && other.id_field("employee_id").as_deref() == Some(employee_id)
            && other.id_field("cycle_id").as_deref() == Some(cycle_id)
            && other.is("earning_type", earning_type)
            && other.is("status", "approved")
    });
    match conflict {
        Some((other_id, _)) => Err(ToolError::Conflict(format!(
            "Conflicting earning found: Another '{earning_type}' earning (ID: {other_id}) is already approved \
             for employee '{employee_id}' in cycle '{cycle_id}'. Cannot approve duplicate earnings of the same type \
             for the same employee in the same cycle."
        ))),
        None => Ok(()),
    }
}

#[derive(Deserialize)]
struct CreateEarningArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    earning_type: Option<String>,
    amount: Option<f64>,
    status: Option<String>,
    justification_notes: Option<String>,
}

pub struct CreatePayrollEarningTool;

impl Tool for CreatePayrollEarningTool {
    fn name(&self) -> &str {
        "create_payroll_earning"
    }

    fn description(&self) -> &str {
        "Create a payroll earning (bonus, incentive, allowance or overtime) for an employee in a cycle."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "cycle_id": {"type": "string"},
                "earning_type": {"type": "string", "enum": EARNING_TYPES},
                "amount": {"type": "number", "minimum": 0},
                "status": {"type": "string", "enum": NEW_EARNING_STATUSES, "default": "pending"},
                "justification_notes": {"type": "string"}
            },
            "required": ["employee_id", "cycle_id", "earning_type", "amount"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYROLL_EARNINGS, EMPLOYEES, PAYROLL_CYCLES])?;
        let args: CreateEarningArgs = args::parse(args)?;
        let employee_id = args::required("employee_id", args.employee_id)?;
        let cycle_id = args::required("cycle_id", args.cycle_id)?;
        let earning_type = args::required_str("earning_type", args.earning_type)?;
        let amount = args::required("amount", args.amount)?;

        lookup::ensure(store, EMPLOYEES, &employee_id, "Employee")?;
        lookup::ensure(store, PAYROLL_CYCLES, &cycle_id, "Payroll cycle")?;
        one_of("earning_type", &earning_type, EARNING_TYPES)?;
        non_negative("amount", amount)?;
        let status = args.status.unwrap_or_else(|| "pending".to_string());
        one_of("status", &status, NEW_EARNING_STATUSES)?;
        let justified = args.justification_notes.as_deref().is_some_and(|n| !n.trim().is_empty());
        let status = bonus_status(&earning_type, Some(amount), status, justified)?;
        if status == "approved" {
            ensure_single_approval(store, None, &employee_id, &cycle_id, &earning_type)?;
        }

        let earning_id = next_numeric_id(store.table(PAYROLL_EARNINGS)?);
        let now = store.now();
        let earning = json!({
            "earning_id": earning_id,
            "employee_id": employee_id,
            "cycle_id": cycle_id,
            "earning_type": earning_type,
            "amount": amount,
            "status": status,
            "justification_notes": args.justification_notes.unwrap_or_default(),
            "created_at": now,
            "last_updated": now
        });
        store.insert(
            PAYROLL_EARNINGS,
            &earning_id,
            earning.as_object().cloned().unwrap_or_default(),
        )?;
        info!(earning_id = %earning_id, "Payroll earning created");

        Ok(json!({
            "success": true,
            "earning": earning,
            "message": format!("Payroll earning {earning_id} created successfully")
        }))
    }
}

#[derive(Deserialize)]
struct UpdateEarningArgs {
    #[serde(default, deserialize_with = "opt_id")]
    earning_id: Option<String>,
    amount: Option<f64>,
    status: Option<String>,
    earning_type: Option<String>,
}

pub struct UpdatePayrollEarningTool;

impl Tool for UpdatePayrollEarningTool {
    fn name(&self) -> &str {
        "update_payroll_earning"
    }

    fn description(&self) -> &str {
        "Update amount, type or status of a payroll earning. Large bonuses require justification, \
         and only one earning of a type may be approved per employee and cycle."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "earning_id": {"type": "string"},
                "amount": {"type": "number", "exclusiveMinimum": 0},
                "status": {"type": "string", "enum": EARNING_STATUSES},
                "earning_type": {"type": "string", "enum": EARNING_TYPES}
            },
            "required": ["earning_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYROLL_EARNINGS])?;
        let args: UpdateEarningArgs = args::parse(args)?;
        let earning_id = args::required("earning_id", args.earning_id)?;
        let current = lookup::record(store, PAYROLL_EARNINGS, &earning_id, "Payroll earning")?;
        if args.amount.is_none() && args.status.is_none() && args.earning_type.is_none() {
            return Err(ToolError::InvalidArgs(
                "No fields provided to update. Provide at least one field".into(),
            ));
        }
        if args.amount.is_some_and(|a| a <= 0.0) {
            return Err(ToolError::InvalidArgs(
                "amount must be a positive number when provided".into(),
            ));
        }

        let new_type = args
            .earning_type
            .clone()
            .or_else(|| current.str_field("earning_type").map(str::to_string))
            .unwrap_or_default();
        let new_status = args
            .status
            .clone()
            .or_else(|| current.str_field("status").map(str::to_string))
            .unwrap_or_default();
        let new_amount = args.amount.or_else(|| current.f64_field("amount"));
        one_of("earning_type", &new_type, EARNING_TYPES)?;
        one_of("status", &new_status, EARNING_STATUSES)?;

        let justified = current
            .str_field("justification_notes")
            .is_some_and(|n| !n.trim().is_empty());
        let new_status = bonus_status(&new_type, new_amount, new_status, justified)?;

        if new_status == "approved" {
            let employee_id = current.id_field("employee_id").unwrap_or_default();
            let cycle_id = current.id_field("cycle_id").unwrap_or_default();
            ensure_single_approval(store, Some(&earning_id), &employee_id, &cycle_id, &new_type)?;
        }

        let now = store.now();
        let earning = lookup::record_mut(store, PAYROLL_EARNINGS, &earning_id, "Payroll earning")?;
        if let Some(amount) = args.amount {
            earning.insert("amount".into(), json!(amount));
        }
        if let Some(earning_type) = args.earning_type {
            earning.insert("earning_type".into(), json!(earning_type));
        }
        earning.insert("status".into(), json!(new_status));
        earning.insert("last_updated".into(), json!(now));
        info!(earning_id = %earning_id, status = %new_status, "Payroll earning updated");
        Ok(Value::Object(earning.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hr::fixtures;

    #[test]
    fn creates_pending_input() {
        let mut store = fixtures::store();
        let out = CreatePayrollInputTool
            .invoke(
                &mut store,
                json!({"employee_id": "1", "cycle_id": "1", "hours_worked": 40, "overtime_hours": 2}),
            )
            .expect("created");
        assert_eq!(out["input_id"], "2");
        assert_eq!(out["status"], "pending");
        assert_eq!(out["allowance_amount"], 0.0);
        assert!(out["payroll_variance_percent"].is_null());
    }

    #[test]
    fn excess_hours_flag_the_employee() {
        let mut store = fixtures::store();
        let err = CreatePayrollInputTool
            .invoke(
                &mut store,
                json!({"employee_id": "1", "cycle_id": "1", "hours_worked": 55, "overtime_hours": 10}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("exceed 60 hours"));
        let employee = store.get(EMPLOYEES, "1").expect("table").expect("employee");
        assert_eq!(employee.bool_field("flag_potential_overtime_violation"), Some(true));
        assert_eq!(store.table(PAYROLL_INPUTS).expect("table").len(), 1);
    }

    #[test]
    fn large_allowance_requires_review() {
        let mut store = fixtures::store();
        let err = CreatePayrollInputTool
            .invoke(
                &mut store,
                json!({"employee_id": "2", "cycle_id": "1", "hours_worked": 40, "allowance_amount": 20800}),
            )
            .unwrap_err();
        assert!(err.to_string().starts_with("Allowance amount (20800)"));
        let employee = store.get(EMPLOYEES, "2").expect("table").expect("employee");
        assert_eq!(employee.bool_field("flag_requires_payroll_review"), Some(true));
    }

    #[test]
    fn closed_cycle_rejects_input() {
        let mut store = fixtures::store();
        let err = CreatePayrollInputTool
            .invoke(&mut store, json!({"employee_id": "1", "cycle_id": "2", "hours_worked": 40}))
            .unwrap_err();
        assert!(err.to_string().contains("status 'open'"));
    }

    #[test]
    fn variance_over_one_percent_forces_review() {
        let mut store = fixtures::store();
        // 80 + 4 + 100 = 184 -> 90 + 4 + 100 = 194
        let out = UpdatePayrollInputTool
            .invoke(&mut store, json!({"input_id": "1", "hours_worked": 90, "status": "pending"}))
            .expect("updated");
        assert_eq!(out["status"], "review");
        assert_eq!(out["issue_field"], "variance exceeds 1%");
        let variance = out["payroll_variance_percent"].as_f64().expect("variance");
        assert!((variance - 5.434_782).abs() < 1e-4);
    }

    #[test]
    fn status_only_update_skips_variance() {
        let mut store = fixtures::store();
        let out = UpdatePayrollInputTool
            .invoke(&mut store, json!({"input_id": "1", "status": "review", "issue_field": "manual"}))
            .expect("updated");
        assert_eq!(out["status"], "review");
        assert_eq!(out["issue_field"], "manual");
        assert!(out.get("payroll_variance_percent").map_or(true, Value::is_null));
    }

    #[test]
    fn update_input_needs_a_field() {
        let mut store = fixtures::store();
        let err = UpdatePayrollInputTool
            .invoke(&mut store, json!({"input_id": "1"}))
            .unwrap_err();
        assert!(err.to_string().starts_with("No fields provided"));
    }

    #[test]
    fn creates_earning_with_defaults() {
        let mut store = fixtures::store();
        let out = CreatePayrollEarningTool
            .invoke(
                &mut store,
                json!({"employee_id": 1, "cycle_id": 1, "earning_type": "overtime", "amount": 120}),
            )
            .expect("created");
        assert_eq!(out["earning"]["earning_id"], "3");
        assert_eq!(out["earning"]["status"], "pending");
        assert_eq!(out["earning"]["justification_notes"], "");
    }

    #[test]
    fn rejects_unknown_earning_type() {
        let mut store = fixtures::store();
        let err = CreatePayrollEarningTool
            .invoke(
                &mut store,
                json!({"employee_id": "1", "cycle_id": "1", "earning_type": "tip", "amount": 1}),
            )
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid earning_type"));
    }

    #[test]
    fn large_bonus_requires_justification() {
        let mut store = fixtures::store();
        let out = UpdatePayrollEarningTool
            .invoke(&mut store, json!({"earning_id": "1", "amount": 6000, "status": "pending"}))
            .expect("updated");
        assert_eq!(out["status"], "require_justification");
    }

    #[test]
    fn second_approval_of_same_type_conflicts() {
        let mut store = fixtures::store();
        CreatePayrollEarningTool
            .invoke(
                &mut store,
                json!({"employee_id": "2", "cycle_id": "1", "earning_type": "bonus", "amount": 100}),
            )
            .expect("created");
        let err = UpdatePayrollEarningTool
            .invoke(&mut store, json!({"earning_id": "3", "status": "approved"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::Conflict(_)));
        assert!(err.to_string().contains("(ID: 1)"));
    }

    #[test]
    fn creating_an_approved_duplicate_conflicts() {
        let mut store = fixtures::store();
        let err = CreatePayrollEarningTool
            .invoke(
                &mut store,
                json!({"employee_id": "2", "cycle_id": "1", "earning_type": "bonus",
                       "amount": 900, "status": "approved"}),
            )
            .unwrap_err();
        assert!(matches!(err, ToolError::Conflict(_)));
        let approved_bonuses = store
            .records(PAYROLL_EARNINGS)
            .expect("table")
            .filter(|(_, e)| e.is("earning_type", "bonus") && e.is("status", "approved"))
            .count();
        assert_eq!(approved_bonuses, 1);
    }

    #[test]
    fn created_large_bonus_waits_for_justification() {
        let mut store = fixtures::store();
        let out = CreatePayrollEarningTool
            .invoke(
                &mut store,
                json!({"employee_id": "1", "cycle_id": "1", "earning_type": "bonus", "amount": 9000}),
            )
            .expect("created");
        assert_eq!(out["earning"]["status"], "require_justification");

        let err = CreatePayrollEarningTool
            .invoke(
                &mut store,
                json!({"employee_id": "1", "cycle_id": "1", "earning_type": "bonus",
                       "amount": 9000, "status": "approved"}),
            )
            .unwrap_err();
        assert!(err.to_string().contains("require justification_notes"));

        let out = CreatePayrollEarningTool
            .invoke(
                &mut store,
                json!({"employee_id": "1", "cycle_id": "1", "earning_type": "bonus", "amount": 9000,
                       "status": "approved", "justification_notes": "Closed the Q4 migration"}),
            )
            .expect("created");
        assert_eq!(out["earning"]["status"], "approved");
    }

    #[test]
    fn approving_unjustified_large_bonus_is_rejected() {
        let mut store = fixtures::store();
        let err = UpdatePayrollEarningTool
            .invoke(&mut store, json!({"earning_id": "2", "earning_type": "bonus", "amount": 7000, "status": "approved"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::Rejected(_)));
    }
}
