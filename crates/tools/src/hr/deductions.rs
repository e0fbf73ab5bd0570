use super::{DEDUCTIONS, DEDUCTION_RULES, EMPLOYEES, PAYROLL_CYCLES};
use crate::args::{self, opt_id};
use crate::validate::{date, non_negative, one_of, opt_one_of};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const DEDUCTION_STATUSES: &[&str] = &["valid", "invalid_limit_exceeded"];

fn active_rule<'a>(store: &'a Store, rule_id: &str) -> Result<&'a Record, ToolError> {
    let rule = store.get(DEDUCTION_RULES, rule_id)?.ok_or_else(|| {
        ToolError::Halt(format!("Deduction rule with ID '{rule_id}' not found"))
    })?;
    if !rule.is("status", "active") {
        return Err(ToolError::Rejected(format!(
            "Deduction rule '{rule_id}' must have 'active' status. Current status: '{}'",
            rule.str_or("status", "")
        )));
    }
    Ok(rule)
}

fn require_active_employee<'a>(store: &'a Store, employee_id: &str) -> Result<&'a Record, ToolError> {
    let employee = lookup::record(store, EMPLOYEES, employee_id, "Employee")?;
    if !employee.is("status", "active") {
        return Err(ToolError::Rejected(format!(
            "Employee '{employee_id}' must have 'active' status. Current status: '{}'",
            employee.str_or("status", "")
        )));
    }
    Ok(employee)
}

/// One deduction per employee, cycle and rule.
fn ensure_unique(
    store: &Store,
    except: Option<&str>,
    employee_id: &str,
    cycle_id: &str,
    rule_id: &str,
) -> Result<(), ToolError> {
    let existing = store.records(DEDUCTIONS)?.find(|(id, d)| {
        except != Some(id.as_str())
            && d.refers_to("employee_id", employee_id)
            && d.refers_to("cycle_id", cycle_id)
            && d.refers_to("deduction_rule_id", rule_id)
    });
    match existing {
        Some((id, _)) => Err(ToolError::Conflict(format!(
            "Deduction already exists for employee '{employee_id}', cycle '{cycle_id}', \
             and rule '{rule_id}' (deduction_id: '{id}')"
        ))),
        None => Ok(()),
    }
}

#[derive(Deserialize)]
struct CreateDeductionArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    deduction_rule_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    amount: Option<f64>,
    deduction_date: Option<String>,
    status: Option<String>,
}

pub struct CreatePayrollDeductionTool;

impl Tool for CreatePayrollDeductionTool {
    fn name(&self) -> &str {
        "create_payroll_deduction"
    }

    fn description(&self) -> &str {
        "Create a deduction for an active employee under an active deduction rule. \
         A deduction without a cycle applies to every cycle; with a cycle it is unique per rule."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "deduction_rule_id": {"type": "string", "description": "Must be an active rule."},
                "cycle_id": {"type": "string"},
                "amount": {"type": "number", "minimum": 0},
                "deduction_date": {"type": "string", "description": "YYYY-MM-DD"},
                "status": {"type": "string", "enum": DEDUCTION_STATUSES, "default": "valid"}
            },
            "required": ["employee_id", "deduction_rule_id", "amount", "deduction_date"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[DEDUCTIONS, DEDUCTION_RULES, EMPLOYEES, PAYROLL_CYCLES])?;
        let args: CreateDeductionArgs = args::parse(args)?;
        let employee_id = args::required_str("employee_id", args.employee_id)?;
        let rule_id = args::required_str("deduction_rule_id", args.deduction_rule_id)?;
        let amount = args::required("amount", args.amount)?;
        let deduction_date = args::required_str("deduction_date", args.deduction_date)?;
        date("deduction_date", &deduction_date)?;
        non_negative("amount", amount)?;
        let status = args.status.unwrap_or_else(|| "valid".to_string());
        one_of("status", &status, DEDUCTION_STATUSES)?;

        let full_name = require_active_employee(store, &employee_id)?.str_or("full_name", "").to_string();
        let deduction_type = active_rule(store, &rule_id)?.str_or("deduction_type", "").to_string();
        let cycle_id = args.cycle_id.filter(|c| !c.is_empty());
        if let Some(cycle_id) = cycle_id.as_deref() {
            lookup::ensure(store, PAYROLL_CYCLES, cycle_id, "Payroll cycle")?;
            ensure_unique(store, None, &employee_id, cycle_id, &rule_id)?;
        }

        let deduction_id = next_numeric_id(store.table(DEDUCTIONS)?);
        let now = store.now();
        let deduction = json!({
            "deduction_id": deduction_id,
            "employee_id": employee_id,
            "cycle_id": cycle_id,
            "deduction_rule_id": rule_id,
            "amount": amount,
            "deduction_date": deduction_date,
            "status": status,
            "created_at": now,
            "last_updated": now
        });
        store.insert(DEDUCTIONS, &deduction_id, deduction.as_object().cloned().unwrap_or_default())?;
        info!(deduction_id = %deduction_id, employee_id = %employee_id, "Payroll deduction created");

        Ok(json!({
            "success": true,
            "message": format!(
                "Payroll deduction has been created successfully for employee '{full_name}' ({employee_id}) \
                 with deduction type '{deduction_type}'"
            ),
            "deduction": deduction
        }))
    }
}

#[derive(Deserialize)]
struct UpdateDeductionArgs {
    #[serde(default, deserialize_with = "opt_id")]
    deduction_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    deduction_rule_id: Option<String>,
    /// `""` detaches the deduction from its cycle.
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    amount: Option<f64>,
    deduction_date: Option<String>,
    status: Option<String>,
}

pub struct UpdatePayrollDeductionTool;

impl Tool for UpdatePayrollDeductionTool {
    fn name(&self) -> &str {
        "update_payroll_deduction"
    }

    fn description(&self) -> &str {
        "Update an existing deduction. Changed employee, rule and cycle references are validated \
         the same way as on creation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "deduction_id": {"type": "string"},
                "employee_id": {"type": "string"},
                "deduction_rule_id": {"type": "string"},
                "cycle_id": {"type": "string", "description": "\"\" applies the deduction to every cycle."},
                "amount": {"type": "number", "minimum": 0},
                "deduction_date": {"type": "string", "description": "YYYY-MM-DD"},
                "status": {"type": "string", "enum": DEDUCTION_STATUSES}
            },
            "required": ["deduction_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[DEDUCTIONS, DEDUCTION_RULES, EMPLOYEES, PAYROLL_CYCLES])?;
        let args: UpdateDeductionArgs = args::parse(args)?;
        let deduction_id = args::required("deduction_id", args.deduction_id)?;
        let current = lookup::record(store, DEDUCTIONS, &deduction_id, "Deduction")?;
        if args.employee_id.is_none()
            && args.deduction_rule_id.is_none()
            && args.cycle_id.is_none()
            && args.amount.is_none()
            && args.deduction_date.is_none()
            && args.status.is_none()
        {
            return Err(ToolError::InvalidArgs(
                "No fields provided to update. Provide at least one field".into(),
            ));
        }
        if let Some(amount) = args.amount {
            non_negative("amount", amount)?;
        }
        if let Some(deduction_date) = args.deduction_date.as_deref() {
            date("deduction_date", deduction_date)?;
        }
        opt_one_of("status", args.status.as_deref(), DEDUCTION_STATUSES)?;
        if let Some(employee_id) = args.employee_id.as_deref() {
            require_active_employee(store, employee_id)?;
        }
        if let Some(rule_id) = args.deduction_rule_id.as_deref() {
            active_rule(store, rule_id)?;
        }

        let final_cycle = match args.cycle_id.as_deref() {
            Some("") => None,
            Some(cycle_id) => {
                lookup::ensure(store, PAYROLL_CYCLES, cycle_id, "Payroll cycle")?;
                Some(cycle_id.to_string())
            }
            None => current.id_field("cycle_id").filter(|c| !c.is_empty()),
        };
        let references_changed =
            args.employee_id.is_some() || args.deduction_rule_id.is_some() || args.cycle_id.is_some();
        if let Some(cycle_id) = final_cycle.as_deref().filter(|_| references_changed) {
            let employee_id = args
                .employee_id
                .clone()
                .or_else(|| current.id_field("employee_id"))
                .unwrap_or_default();
            let rule_id = args
                .deduction_rule_id
                .clone()
                .or_else(|| current.id_field("deduction_rule_id"))
                .unwrap_or_default();
            ensure_unique(store, Some(&deduction_id), &employee_id, cycle_id, &rule_id)?;
        }

        let now = store.now();
        let deduction = lookup::record_mut(store, DEDUCTIONS, &deduction_id, "Deduction")?;
        if let Some(employee_id) = args.employee_id {
            deduction.insert("employee_id".into(), json!(employee_id));
        }
        if let Some(rule_id) = args.deduction_rule_id {
            deduction.insert("deduction_rule_id".into(), json!(rule_id));
        }
        if args.cycle_id.is_some() {
            deduction.insert("cycle_id".into(), json!(final_cycle));
        }
        if let Some(amount) = args.amount {
            deduction.insert("amount".into(), json!(amount));
        }
        if let Some(deduction_date) = args.deduction_date {
            deduction.insert("deduction_date".into(), json!(deduction_date));
        }
        if let Some(status) = args.status {
            deduction.insert("status".into(), json!(status));
        }
        deduction.insert("last_updated".into(), json!(now));
        info!(deduction_id = %deduction_id, "Payroll deduction updated");
        Ok(json!({"success": true, "deduction": deduction.clone()}))
    }
}
