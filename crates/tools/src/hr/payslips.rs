use super::calc::PayCalculation;
use super::{active_employee, workable_cycle, EMPLOYEES, PAYMENTS, PAYROLL_CYCLES, PAYSLIPS};
use crate::args::{self, opt_id};
use crate::validate::one_of;
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::record::round2;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const PAYSLIP_STATUSES: &[&str] = &["draft", "released", "updated"];

#[derive(Deserialize)]
struct CreatePayslipArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
}

pub struct CreatePayslipTool;

impl Tool for CreatePayslipTool {
    fn name(&self) -> &str {
        "create_payslip"
    }

    fn description(&self) -> &str {
        "Create a draft payslip with net pay computed from the payroll input, approved earnings \
         and valid deductions. hourly_rate = base_salary / (52 x 80); overtime pays 1.5x."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string", "description": "Active employee."},
                "cycle_id": {"type": "string", "description": "Cycle in open or approved status."}
            },
            "required": ["employee_id", "cycle_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYSLIPS, EMPLOYEES, PAYROLL_CYCLES])?;
        let args: CreatePayslipArgs = args::parse(args)?;
        let (Some(employee_id), Some(cycle_id)) = (args.employee_id, args.cycle_id) else {
            return Err(ToolError::InvalidArgs(
                "Missing required parameters. Required: employee_id, cycle_id".into(),
            ));
        };

        let base_salary = active_employee(store, &employee_id)?.f64_field("base_salary");
        workable_cycle(store, &cycle_id)?;
        let exists = store.records(PAYSLIPS)?.any(|(_, p)| {
            p.refers_to("employee_id", &employee_id) && p.refers_to("cycle_id", &cycle_id)
        });
        if exists {
            return Err(ToolError::Halt(format!(
                "Payslip already exists for employee {employee_id} in cycle {cycle_id}"
            )));
        }
        let no_input = || {
            ToolError::Halt(format!(
                "No payroll input found for employee {employee_id} in cycle {cycle_id}"
            ))
        };
        if super::calc::payroll_input(store, &employee_id, &cycle_id)?.is_none() {
            return Err(no_input());
        }
        let base_salary = base_salary
            .filter(|s| *s > 0.0)
            .ok_or_else(|| ToolError::Halt("Invalid or missing base salary for employee".into()))?;

        let calc = PayCalculation::for_cycle(store, &employee_id, &cycle_id, base_salary)?
            .ok_or_else(no_input)?;
        if calc.net_pay < 0.0 {
            return Err(ToolError::Halt(format!(
                "Calculated net pay is negative ({:.2}). Check deductions and earnings.",
                calc.net_pay
            )));
        }

        let payslip_id = next_numeric_id(store.table(PAYSLIPS)?);
        let now = store.now();
        let payslip = json!({
            "payslip_id": payslip_id,
            "employee_id": employee_id,
            "cycle_id": cycle_id,
            "net_pay_value": round2(calc.net_pay),
            "status": "draft",
            "created_at": now,
            "last_updated": now
        });
        store.insert(PAYSLIPS, &payslip_id, payslip.as_object().cloned().unwrap_or_default())?;
        info!(payslip_id = %payslip_id, net_pay = calc.net_pay, "Payslip drafted");
        Ok(payslip)
    }
}

#[derive(Deserialize)]
struct PayslipStatusArgs {
    #[serde(default, deserialize_with = "opt_id")]
    payslip_id: Option<String>,
    status: Option<String>,
}

pub struct UpdatePayslipStatusTool;

impl Tool for UpdatePayslipStatusTool {
    fn name(&self) -> &str {
        "update_payslip_status"
    }

    fn description(&self) -> &str {
        "Change a payslip's status and recalculate its net pay from current payroll data. \
         A negative result is recorded as 0."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "payslip_id": {"type": "string"},
                "status": {"type": "string", "enum": PAYSLIP_STATUSES}
            },
            "required": ["payslip_id", "status"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[EMPLOYEES, PAYSLIPS])?;
        let args: PayslipStatusArgs = args::parse(args)?;
        let payslip_id = args::required("payslip_id", args.payslip_id)?;
        let payslip = lookup::record(store, PAYSLIPS, &payslip_id, "Payslip")?;
        let status = args
            .status
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("status is required for update".into()))?;
        one_of("status", &status, PAYSLIP_STATUSES)?;

        let employee_id = payslip.id_field("employee_id").unwrap_or_default();
        let cycle_id = payslip.id_field("cycle_id").unwrap_or_default();
        let employee = lookup::record(store, EMPLOYEES, &employee_id, "Employee")?;
        let base_salary = employee.f64_field("base_salary").ok_or_else(|| {
            ToolError::Rejected(format!(
                "Employee '{employee_id}' does not have a base_salary defined"
            ))
        })?;

        let calc = PayCalculation::for_cycle(store, &employee_id, &cycle_id, base_salary)?
            .ok_or_else(|| {
                ToolError::NotFound(format!(
                    "No payroll input found for employee '{employee_id}' in cycle '{cycle_id}'"
                ))
            })?;
        let net_pay = round2(calc.net_pay.max(0.0));

        let now = store.now();
        let payslip = lookup::record_mut(store, PAYSLIPS, &payslip_id, "Payslip")?;
        payslip.insert("status".into(), json!(status));
        payslip.insert("net_pay_value".into(), json!(net_pay));
        payslip.insert("last_updated".into(), json!(now));
        let snapshot = payslip.clone();
        info!(payslip_id = %payslip_id, status = %status, "Payslip status updated");

        let mut details = calc.rounded();
        details.net_pay = net_pay;
        Ok(json!({
            "success": true,
            "payslip": snapshot,
            "message": format!("Payslip '{payslip_id}' updated successfully"),
            "calculation_details": details
        }))
    }
}

#[derive(Deserialize)]
struct PayslipOrPaymentArgs {
    entity_type: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    entity_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    status: Option<String>,
    payment_method: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    source_payslip_id: Option<String>,
}

pub struct GetPayslipOrPaymentTool;

impl Tool for GetPayslipOrPaymentTool {
    fn name(&self) -> &str {
        "get_payslip_or_payment"
    }

    fn description(&self) -> &str {
        "Fetch payslips or payments by ID or by employee, cycle, status, method or source payslip."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_type": {"type": "string", "enum": ["payslip", "payment"]},
                "entity_id": {"type": "string"},
                "employee_id": {"type": "string"},
                "cycle_id": {"type": "string", "description": "Payslips only."},
                "status": {"type": "string"},
                "payment_method": {"type": "string", "description": "Payments only."},
                "source_payslip_id": {"type": "string", "description": "Payments only."}
            },
            "required": ["entity_type"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        let args: PayslipOrPaymentArgs = args::parse(args)?;
        let entity_type = args
            .entity_type
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("Missing required parameter: entity_type".into()))?;
        one_of("entity_type", &entity_type, &["payslip", "payment"])?;
        let (table, label, id_field) = if entity_type == "payslip" {
            (PAYSLIPS, "Payslip", "payslip_id")
        } else {
            (PAYMENTS, "Payment", "payment_id")
        };
        store.check_tables(&[table])?;

        if let Some(entity_id) = args.entity_id.filter(|s| !s.is_empty()) {
            let record = lookup::record(store, table, &entity_id, label)?;
            return Ok(json!({
                "success": true,
                "entity_type": entity_type,
                "count": 1,
                "results": [record]
            }));
        }

        let mut filters = Map::new();
        let mut add = |field: &str, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                filters.insert(field.to_string(), Value::String(value));
            }
        };
        add("employee_id", args.employee_id);
        add("status", args.status);
        if entity_type == "payslip" {
            add("cycle_id", args.cycle_id);
        } else {
            add("source_payslip_id", args.source_payslip_id);
            add("payment_method", args.payment_method);
        }
        let results = lookup::filter_records(store, table, id_field, &filters)?;

        Ok(json!({
            "success": true,
            "entity_type": entity_type,
            "count": results.len(),
            "results": results
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hr::fixtures;

    #[test]
    fn drafts_payslip_with_net_pay() {
        let mut store = fixtures::store();
        let out = CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .expect("payslip");
        assert_eq!(out["payslip_id"], "1");
        assert_eq!(out["net_pay_value"], 2020.0);
        assert_eq!(out["status"], "draft");
    }

    #[test]
    fn duplicate_payslip_halts() {
        let mut store = fixtures::store();
        CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .expect("payslip");
        let err = CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: Payslip already exists for employee 2 in cycle 1"
        );
    }

    #[test]
    fn inactive_employee_and_missing_input_halt() {
        let mut store = fixtures::store();
        let err = CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "3", "cycle_id": "1"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: Employee not found or inactive");

        let err = CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "1", "cycle_id": "1"}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Halt: No payroll input found"));

        let err = CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "2"}))
            .unwrap_err();
        assert!(err.to_string().contains("'open' or 'approved'"));
    }

    #[test]
    fn negative_net_pay_halts() {
        let mut store = fixtures::store();
        store
            .table_mut("deductions")
            .expect("table")
            .insert("9".into(), json!({"employee_id": "2", "amount": 5000.0, "status": "valid"}));
        let err = CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Halt: Calculated net pay is negative (-2980.00)"));
    }

    #[test]
    fn status_update_recalculates() {
        let mut store = fixtures::store();
        CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .expect("payslip");
        let out = UpdatePayslipStatusTool
            .invoke(&mut store, json!({"payslip_id": "1", "status": "released"}))
            .expect("updated");
        assert_eq!(out["payslip"]["status"], "released");
        assert_eq!(out["calculation_details"]["hourly_rate"], 20.0);
        assert_eq!(out["calculation_details"]["net_pay"], 2020.0);
    }

    #[test]
    fn status_update_rejects_unknown_status() {
        let mut store = fixtures::store();
        CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .expect("payslip");
        let err = UpdatePayslipStatusTool
            .invoke(&mut store, json!({"payslip_id": "1", "status": "paid"}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Invalid status"));
    }

    #[test]
    fn fetches_payslips_by_filter_and_id() {
        let mut store = fixtures::store();
        CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .expect("payslip");
        let out = GetPayslipOrPaymentTool
            .invoke(&mut store, json!({"entity_type": "payslip", "employee_id": 2}))
            .expect("payslips");
        assert_eq!(out["count"], 1);

        let err = GetPayslipOrPaymentTool
            .invoke(&mut store, json!({"entity_type": "payment", "entity_id": "4"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Payment with ID '4' not found");
    }
}
