use super::calc::{approved_earnings, deductions_for_cycle};
use super::{
    resolve_employee_id, EMPLOYEES, EMPLOYEE_ASSETS, EXIT_CASES, FINANCE_SETTLEMENTS, PAYROLL_CYCLES,
    PAYROLL_INPUTS,
};
use crate::args::{self, opt_id};
use crate::validate::{self, one_of, prefix_match};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::record::round2;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const EXIT_REASONS: &[&str] = &["voluntary_resignation", "layoff", "misconduct", "policy_violation"];
const CLEARANCE_STATUSES: &[&str] = &["pending", "cleared"];

const MISSING_ASSET_CHARGE: f64 = 500.0;
const DAMAGED_ASSET_CHARGE: f64 = 250.0;

#[derive(Deserialize)]
struct CreateExitArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    reason: Option<String>,
    exit_date: Option<String>,
    exit_clearance_status: Option<String>,
}

pub struct CreateOffboardExitTool;

impl Tool for CreateOffboardExitTool {
    fn name(&self) -> &str {
        "create_offboard_exit"
    }

    fn description(&self) -> &str {
        "Open the exit case of an active employee. An employee can only have one exit case."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "reason": {"type": "string", "enum": EXIT_REASONS},
                "exit_date": {"type": "string", "description": "YYYY-MM-DD"},
                "exit_clearance_status": {"type": "string", "enum": CLEARANCE_STATUSES, "default": "pending"}
            },
            "required": ["employee_id", "reason", "exit_date"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[EXIT_CASES, EMPLOYEES])?;
        let args: CreateExitArgs = args::parse(args)?;
        let employee_id = args::required_str("employee_id", args.employee_id)?;
        let reason = args::required_str("reason", args.reason)?;
        let exit_date = args::required_str("exit_date", args.exit_date)?;

        let employee = lookup::record(store, EMPLOYEES, &employee_id, "Employee")?;
        let status = employee.str_or("status", "").to_lowercase();
        if status != "active" {
            return Err(ToolError::Rejected(format!(
                "Employee with ID '{employee_id}' is not active (status: {status})"
            )));
        }
        one_of("reason", &reason, EXIT_REASONS)?;
        let exit_date = validate::date("exit_date", &exit_date)?;
        let clearance = args.exit_clearance_status.unwrap_or_else(|| "pending".into());
        one_of("exit_clearance_status", &clearance, CLEARANCE_STATUSES)?;

        if let Some((case_id, _)) = store
            .records(EXIT_CASES)?
            .find(|(_, c)| c.refers_to("employee_id", &employee_id))
        {
            return Err(ToolError::Conflict(format!(
                "Employee with ID '{employee_id}' already has an exit case (exit_case_id: {case_id})"
            )));
        }

        let exit_case_id = next_numeric_id(store.table(EXIT_CASES)?);
        let now = store.now();
        let exit_case = json!({
            "exit_case_id": exit_case_id,
            "employee_id": employee_id,
            "reason": reason,
            "exit_date": format!("{}T00:00:00", exit_date.format("%Y-%m-%d")),
            "exit_clearance_status": clearance,
            "created_at": now,
            "last_updated": now
        });
        store.insert(EXIT_CASES, &exit_case_id, exit_case.as_object().cloned().unwrap_or_default())?;
        info!(exit_case_id = %exit_case_id, employee_id = %employee_id, "Exit case opened");

        Ok(json!({
            "success": true,
            "exit_case": exit_case,
            "message": format!("Exit case {exit_case_id} created successfully for employee {employee_id}")
        }))
    }
}

#[derive(Deserialize)]
struct SettlementArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    email: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
}

/// Direction and description of a net settlement amount.
fn payment_direction(net: f64) -> (&'static str, &'static str) {
    if net > 0.0 {
        ("to_employee", "Company owes employee")
    } else if net < 0.0 {
        ("from_employee", "Employee owes company")
    } else {
        ("balanced", "No payment required")
    }
}

pub struct CalculateSettlementTool;

impl Tool for CalculateSettlementTool {
    fn name(&self) -> &str {
        "calculate_settlement"
    }

    fn description(&self) -> &str {
        "Calculate the final settlement of an exiting employee for a payroll cycle and record it \
         as an uncleared finance settlement. Requires a cleared exit case."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "email": {"type": "string", "description": "Used when employee_id is not given."},
                "cycle_id": {"type": "string"}
            },
            "required": ["cycle_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[
            EMPLOYEES,
            EMPLOYEE_ASSETS,
            FINANCE_SETTLEMENTS,
            PAYROLL_CYCLES,
            PAYROLL_INPUTS,
            EXIT_CASES,
        ])?;
        let args: SettlementArgs = args::parse(args)?;
        let email = args.email.filter(|e| !e.is_empty());
        if args.employee_id.is_none() && email.is_none() {
            return Err(ToolError::InvalidArgs(
                "At least one identifier (employee_id or email) must be provided".into(),
            ));
        }
        let cycle_id = args
            .cycle_id
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::Halt("cycle_id is required for settlement calculation".into()))?;

        let employee_id = match args.employee_id {
            Some(id) => id,
            None => resolve_employee_id(store, None, email.as_deref())
                .ok()
                .flatten()
                .ok_or_else(|| ToolError::Halt("Employee with email not found".into()))?,
        };
        let employee = store
            .get(EMPLOYEES, &employee_id)?
            .ok_or_else(|| ToolError::Halt("Employee not found".into()))?;
        if email.as_deref().is_some_and(|e| employee.str_field("email") != Some(e)) {
            return Err(ToolError::Halt("Email does not match employee record".into()));
        }
        let cycle = store
            .get(PAYROLL_CYCLES, &cycle_id)?
            .ok_or_else(|| ToolError::Halt("Payroll cycle not found".into()))?;
        let exit_case = store
            .records(EXIT_CASES)?
            .map(|(_, c)| c)
            .find(|c| c.refers_to("employee_id", &employee_id))
            .ok_or_else(|| ToolError::Halt("Exit case not found for employee".into()))?;
        if !exit_case.is("exit_clearance_status", "cleared") {
            return Err(ToolError::Halt(
                "Exit clearance status must be 'cleared' before settlement calculation".into(),
            ));
        }

        let base_salary = employee.f64_or_zero("base_salary");
        let (mut hours_worked, mut overtime_hours, mut allowance_amount) = (0.0, 0.0, 0.0);
        for (_, input) in store.records(PAYROLL_INPUTS)? {
            if input.refers_to("employee_id", &employee_id) && input.refers_to("cycle_id", &cycle_id) {
                hours_worked += input.f64_or_zero("hours_worked");
                overtime_hours += input.f64_or_zero("overtime_hours");
                allowance_amount += input.f64_or_zero("allowance_amount");
            }
        }

        let mut breakdown: Map<String, Value> = ["bonus", "incentive", "allowance", "overtime"]
            .iter()
            .map(|k| (k.to_string(), json!(0.0)))
            .collect();
        let mut earning_details = Vec::new();
        let mut total_earnings = 0.0;
        for earning in approved_earnings(store, &employee_id, &cycle_id)? {
            let amount = earning.f64_or_zero("amount");
            total_earnings += amount;
            let kind = earning.str_field("earning_type");
            if let Some(slot) = kind.and_then(|k| breakdown.get_mut(k)) {
                *slot = json!(slot.as_f64().unwrap_or(0.0) + amount);
            }
            earning_details.push(json!({
                "earning_id": earning.get("earning_id"),
                "type": kind,
                "amount": amount
            }));
        }

        let mut deduction_details = Vec::new();
        let mut total_deductions = 0.0;
        for (id, deduction) in deductions_for_cycle(store, &employee_id, &cycle_id)? {
            let amount = deduction.f64_or_zero("amount");
            total_deductions += amount;
            deduction_details.push(json!({
                "deduction_id": id,
                "amount": amount,
                "date": deduction.get("deduction_date")
            }));
        }

        let (mut missing, mut damaged) = (Vec::new(), Vec::new());
        for (id, asset) in store.records(EMPLOYEE_ASSETS)? {
            if !asset.refers_to("employee_id", &employee_id) {
                continue;
            }
            let (bucket, charge) = match asset.str_field("status") {
                Some("missing") => (&mut missing, MISSING_ASSET_CHARGE),
                Some("damaged") => (&mut damaged, DAMAGED_ASSET_CHARGE),
                _ => continue,
            };
            bucket.push(json!({"asset_id": id, "name": asset.get("item_name"), "charge": charge}));
        }
        let missing_subtotal = missing.len() as f64 * MISSING_ASSET_CHARGE;
        let damaged_subtotal = damaged.len() as f64 * DAMAGED_ASSET_CHARGE;
        let asset_charges = missing_subtotal + damaged_subtotal;

        let gross_pay = round2(base_salary + total_earnings + allowance_amount);
        let total_charges = round2(total_deductions + asset_charges);
        let net_settlement = round2(gross_pay - total_charges);
        let (direction, direction_description) = payment_direction(net_settlement);

        let summary = json!({
            "employee_id": employee_id,
            "employee_name": employee.get("full_name"),
            "employee_email": employee.get("email"),
            "cycle_id": cycle_id,
            "cycle_period": {
                "start_date": cycle.get("start_date"),
                "end_date": cycle.get("end_date"),
                "frequency": cycle.get("frequency")
            },
            "exit_date": exit_case.get("exit_date"),
            "exit_reason": exit_case.get("reason"),
            "calculation_breakdown": {
                "gross_pay_components": {
                    "base_salary": base_salary,
                    "earnings": {
                        "total": round2(total_earnings),
                        "breakdown": breakdown,
                        "details": earning_details
                    },
                    "allowances": allowance_amount,
                    "total_gross_pay": gross_pay
                },
                "deductions_and_charges": {
                    "payroll_deductions": {"total": round2(total_deductions), "details": deduction_details},
                    "asset_charges": {
                        "total": asset_charges,
                        "missing_assets": {"count": missing.len(), "items": missing, "subtotal": missing_subtotal},
                        "damaged_assets": {"count": damaged.len(), "items": damaged, "subtotal": damaged_subtotal}
                    },
                    "total_charges": total_charges
                },
                "payroll_inputs": {
                    "hours_worked": hours_worked,
                    "overtime_hours": overtime_hours,
                    "allowance_amount": allowance_amount
                }
            }
        });

        let settlement_id = next_numeric_id(store.table(FINANCE_SETTLEMENTS)?);
        let now = store.now();
        let settlement = json!({
            "settlement_id": settlement_id,
            "employee_id": employee_id,
            "amount": net_settlement,
            "is_cleared": false,
            "created_at": now,
            "last_updated": now
        });
        store.insert(
            FINANCE_SETTLEMENTS,
            &settlement_id,
            settlement.as_object().cloned().unwrap_or_default(),
        )?;
        info!(settlement_id = %settlement_id, employee_id = %employee_id, net = net_settlement, "Settlement calculated");

        let mut out = json!({"success": true});
        if let (Some(out), Value::Object(summary)) = (out.as_object_mut(), summary) {
            out.extend(summary);
            out.insert("net_settlement_amount".into(), json!(net_settlement));
            out.insert("payment_direction".into(), json!(direction));
            out.insert("payment_description".into(), json!(direction_description));
            out.insert("requires_payment".into(), json!(net_settlement != 0.0));
            out.insert("calculated_at".into(), json!(now));
            out.insert(
                "new_settlement_record".into(),
                json!({"settlement_id": settlement_id, "created": true}),
            );
        }
        Ok(out)
    }
}

#[derive(Deserialize)]
struct GetSettlementsArgs {
    #[serde(default, deserialize_with = "opt_id")]
    settlement_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    is_cleared: Option<bool>,
    min_amount: Option<f64>,
    max_amount: Option<f64>,
    created_at: Option<String>,
    last_updated: Option<String>,
}

pub struct GetSettlementsTool;

impl Tool for GetSettlementsTool {
    fn name(&self) -> &str {
        "get_settlements"
    }

    fn description(&self) -> &str {
        "List finance settlements filtered by ID, employee, cleared flag, amount range or date prefix."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "settlement_id": {"type": "string"},
                "employee_id": {"type": "string"},
                "is_cleared": {"type": "boolean"},
                "min_amount": {"type": "number", "minimum": 0},
                "max_amount": {"type": "number", "minimum": 0},
                "created_at": {"type": "string", "description": "Prefix, e.g. 2025-11"},
                "last_updated": {"type": "string", "description": "Prefix, e.g. 2025-11-16"}
            },
            "required": []
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[FINANCE_SETTLEMENTS])?;
        let args: GetSettlementsArgs = args::parse(args)?;
        if let Some(min) = args.min_amount {
            validate::non_negative("min_amount", min)?;
        }
        if let Some(max) = args.max_amount {
            validate::non_negative("max_amount", max)?;
        }
        if let (Some(min), Some(max)) = (args.min_amount, args.max_amount) {
            if min > max {
                return Err(ToolError::InvalidArgs(
                    "Invalid range: min_amount cannot be greater than max_amount".into(),
                ));
            }
        }

        let settlements: Vec<Value> = store
            .records(FINANCE_SETTLEMENTS)?
            .filter(|(id, s)| {
                args.settlement_id.as_deref().map_or(true, |want| {
                    s.id_field("settlement_id").as_deref().unwrap_or(id.as_str()) == want
                })
            })
            .filter(|(_, s)| args.employee_id.as_deref().map_or(true, |e| s.refers_to("employee_id", e)))
            .filter(|(_, s)| args.is_cleared.map_or(true, |c| s.bool_field("is_cleared") == Some(c)))
            .filter(|(_, s)| {
                let amount = s.f64_field("amount");
                args.min_amount.map_or(true, |min| amount.is_some_and(|a| a >= min))
                    && args.max_amount.map_or(true, |max| amount.is_some_and(|a| a <= max))
            })
            .filter(|(_, s)| {
                args.created_at.as_deref().map_or(true, |p| prefix_match(s.str_field("created_at"), p))
                    && args
                        .last_updated
                        .as_deref()
                        .map_or(true, |p| prefix_match(s.str_field("last_updated"), p))
            })
            .map(|(_, s)| Value::Object(s.clone()))
            .collect();

        Ok(json!({"success": true, "settlements": settlements}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hr::fixtures;

    fn exiting_store(clearance: &str) -> Store {
        let mut store = fixtures::store();
        CreateOffboardExitTool
            .invoke(
                &mut store,
                json!({"employee_id": "2", "reason": "layoff", "exit_date": "2025-11-30",
                       "exit_clearance_status": clearance}),
            )
            .expect("exit case");
        store
            .insert(
                EMPLOYEE_ASSETS,
                "1",
                json!({"asset_id": "1", "employee_id": "2", "item_name": "Laptop", "status": "missing"})
                    .as_object()
                    .cloned()
                    .expect("object"),
            )
            .expect("asset");
        store
    }

    #[test]
    fn exit_case_stores_midnight_timestamp() {
        let mut store = fixtures::store();
        let out = CreateOffboardExitTool
            .invoke(&mut store, json!({"employee_id": 1, "reason": "voluntary_resignation", "exit_date": "2025-12-31"}))
            .expect("exit case");
        assert_eq!(out["exit_case"]["exit_date"], "2025-12-31T00:00:00");
        assert_eq!(out["exit_case"]["exit_clearance_status"], "pending");

        let err = CreateOffboardExitTool
            .invoke(&mut store, json!({"employee_id": "1", "reason": "layoff", "exit_date": "2026-01-02"}))
            .unwrap_err();
        assert!(err.to_string().contains("already has an exit case (exit_case_id: 1)"));
    }

    #[test]
    fn inactive_employee_cannot_exit() {
        let mut store = fixtures::store();
        let err = CreateOffboardExitTool
            .invoke(&mut store, json!({"employee_id": "3", "reason": "layoff", "exit_date": "2025-12-01"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Employee with ID '3' is not active (status: inactive)");
    }

    #[test]
    fn settlement_requires_cleared_exit() {
        let mut store = exiting_store("pending");
        let err = CalculateSettlementTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: Exit clearance status must be 'cleared' before settlement calculation"
        );
    }

    #[test]
    fn settlement_nets_earnings_against_charges() {
        let mut store = exiting_store("cleared");
        let out = CalculateSettlementTool
            .invoke(&mut store, json!({"email": "omar@corp.test", "cycle_id": "1"}))
            .expect("settlement");
        // 83200 + 250 + 100 - (50 + 500)
        assert_eq!(out["net_settlement_amount"], 83000.0);
        assert_eq!(out["payment_direction"], "to_employee");
        assert_eq!(
            out["calculation_breakdown"]["gross_pay_components"]["earnings"]["breakdown"]["bonus"],
            250.0
        );
        assert_eq!(
            out["calculation_breakdown"]["deductions_and_charges"]["asset_charges"]["missing_assets"]["count"],
            1
        );

        let listed = GetSettlementsTool
            .invoke(&mut store, json!({"employee_id": "2", "is_cleared": false, "min_amount": 1000}))
            .expect("settlements");
        assert_eq!(listed["settlements"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn settlement_without_cycle_halts() {
        let mut store = exiting_store("cleared");
        let err = CalculateSettlementTool
            .invoke(&mut store, json!({"employee_id": "2"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: cycle_id is required for settlement calculation");
    }

    #[test]
    fn amount_range_is_validated() {
        let mut store = fixtures::store();
        let err = GetSettlementsTool
            .invoke(&mut store, json!({"min_amount": 10, "max_amount": 5}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid range: min_amount cannot be greater than max_amount");
    }

    #[test]
    fn direction_follows_sign() {
        assert_eq!(payment_direction(-1.0).0, "from_employee");
        assert_eq!(payment_direction(0.0).0, "balanced");
    }
}
