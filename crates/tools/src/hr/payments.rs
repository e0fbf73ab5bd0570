use super::{active_employee, workable_cycle, EMPLOYEES, PAYMENTS, PAYROLL_CYCLES, PAYSLIPS};
use crate::args::{self, opt_id};
use crate::{Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const PAYMENT_METHODS: &[&str] = &["Bank Transfer", "Check"];
const PAYMENT_STATUSES: &[&str] = &["pending", "completed", "failed"];

#[derive(Deserialize)]
struct CreatePaymentArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    payment_method: Option<String>,
    amount: Option<f64>,
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    source_payslip_id: Option<String>,
}

pub struct CreatePaymentTool;

impl Tool for CreatePaymentTool {
    fn name(&self) -> &str {
        "create_payment"
    }

    fn description(&self) -> &str {
        "Create a pending payment for an active employee, optionally tied to a cycle and a released payslip."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "payment_method": {"type": "string", "enum": PAYMENT_METHODS},
                "amount": {"type": "number", "exclusiveMinimum": 0},
                "cycle_id": {"type": "string", "description": "Cycle in open or approved status."},
                "source_payslip_id": {
                    "type": "string",
                    "description": "Released or updated payslip of the same employee and cycle."
                }
            },
            "required": ["employee_id", "payment_method", "amount"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYMENTS, EMPLOYEES, PAYROLL_CYCLES, PAYSLIPS])?;
        let args: CreatePaymentArgs = args::parse(args)?;
        let (Some(employee_id), Some(payment_method), Some(amount)) = (
            args.employee_id.filter(|s| !s.is_empty()),
            args.payment_method,
            args.amount,
        ) else {
            return Err(ToolError::InvalidArgs(
                "Missing required parameters. Required: employee_id, payment_method, amount".into(),
            ));
        };
        let payment_method = payment_method.trim().to_string();
        if payment_method.is_empty() {
            return Err(ToolError::Halt(
                "Invalid payment method - payment_method cannot be empty".into(),
            ));
        }
        if !PAYMENT_METHODS.contains(&payment_method.as_str()) {
            return Err(ToolError::Halt(format!(
                "Invalid payment method - must be one of: {}",
                PAYMENT_METHODS.join(", ")
            )));
        }

        active_employee(store, &employee_id)?;
        if let Some(cycle_id) = args.cycle_id.as_deref() {
            workable_cycle(store, cycle_id)?;
        }
        if let Some(payslip_id) = args.source_payslip_id.as_deref() {
            let payslip = store
                .get(PAYSLIPS, payslip_id)?
                .ok_or_else(|| ToolError::Halt("Source payslip not found".into()))?;
            if !payslip.refers_to("employee_id", &employee_id) {
                return Err(ToolError::Halt(
                    "Source payslip does not belong to the specified employee".into(),
                ));
            }
            if !matches!(payslip.str_field("status"), Some("released" | "updated")) {
                return Err(ToolError::Halt(
                    "Source payslip must be in 'released' or 'updated' status".into(),
                ));
            }
            if let Some(cycle_id) = args.cycle_id.as_deref() {
                if !payslip.refers_to("cycle_id", cycle_id) {
                    return Err(ToolError::Halt(
                        "Source payslip cycle does not match the specified cycle".into(),
                    ));
                }
            }
        }
        if amount <= 0.0 {
            return Err(ToolError::Halt(
                "Invalid payment amount - amount must be positive".into(),
            ));
        }

        let payment_id = next_numeric_id(store.table(PAYMENTS)?);
        let now = store.now();
        let payment = json!({
            "payment_id": payment_id,
            "employee_id": employee_id,
            "cycle_id": args.cycle_id,
            "source_payslip_id": args.source_payslip_id,
            "payment_method": payment_method,
            "amount": amount,
            "status": "pending",
            "payment_date": null,
            "created_at": now,
            "last_updated": now
        });
        store.insert(PAYMENTS, &payment_id, payment.as_object().cloned().unwrap_or_default())?;
        info!(payment_id = %payment_id, employee_id = %employee_id, "Payment created");
        Ok(payment)
    }
}

#[derive(Deserialize)]
struct UpdatePaymentArgs {
    #[serde(default, deserialize_with = "opt_id")]
    payment_id: Option<String>,
    status: Option<String>,
    payment_date: Option<String>,
    amount: Option<f64>,
}

/// `YYYY-MM-DD` with a year in 1900..=2100 and plausible month/day numbers.
fn valid_payment_date(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return false;
    };
    match (year.parse::<u32>(), month.parse::<u32>(), day.parse::<u32>()) {
        (Ok(y), Ok(m), Ok(d)) => (1900..=2100).contains(&y) && (1..=12).contains(&m) && (1..=31).contains(&d),
        _ => false,
    }
}

pub struct UpdatePaymentTool;

impl Tool for UpdatePaymentTool {
    fn name(&self) -> &str {
        "update_payment"
    }

    fn description(&self) -> &str {
        "Update status, payment date or amount of a payment."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "payment_id": {"type": "string"},
                "status": {"type": "string", "enum": PAYMENT_STATUSES},
                "payment_date": {"type": "string", "description": "YYYY-MM-DD"},
                "amount": {"type": "number", "exclusiveMinimum": 0}
            },
            "required": ["payment_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYMENTS])?;
        let args: UpdatePaymentArgs = args::parse(args)?;
        let payment_id = args
            .payment_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("Missing required parameter: payment_id".into()))?;
        if !store.contains(PAYMENTS, &payment_id)? {
            return Err(ToolError::Halt("Payment not found".into()));
        }
        if args.status.is_none() && args.payment_date.is_none() && args.amount.is_none() {
            return Err(ToolError::InvalidArgs(
                "At least one optional parameter (status, payment_date, amount) must be provided for updates".into(),
            ));
        }
        if let Some(status) = args.status.as_deref() {
            if !PAYMENT_STATUSES.contains(&status) {
                return Err(ToolError::Halt(format!(
                    "Payment operation failed - status must be one of: {}",
                    PAYMENT_STATUSES.join(", ")
                )));
            }
        }
        if args.amount.is_some_and(|a| a <= 0.0) {
            return Err(ToolError::Halt(
                "Payment operation failed - amount must be positive".into(),
            ));
        }
        if args.payment_date.as_deref().is_some_and(|d| !valid_payment_date(d)) {
            return Err(ToolError::Halt(
                "Payment operation failed - invalid payment_date format. Use YYYY-MM-DD".into(),
            ));
        }

        let now = store.now();
        let payment = store
            .get_mut(PAYMENTS, &payment_id)?
            .ok_or_else(|| ToolError::Halt("Payment not found".into()))?;
        if let Some(status) = args.status {
            payment.insert("status".into(), json!(status));
        }
        if let Some(date) = args.payment_date {
            payment.insert("payment_date".into(), json!(date));
        }
        if let Some(amount) = args.amount {
            payment.insert("amount".into(), json!(amount));
        }
        payment.insert("last_updated".into(), json!(now));
        info!(payment_id = %payment_id, "Payment updated");
        Ok(Value::Object(payment.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hr::fixtures;
    use crate::hr::payslips::{CreatePayslipTool, UpdatePayslipStatusTool};

    fn released_payslip(store: &mut Store) {
        CreatePayslipTool
            .invoke(store, json!({"employee_id": "2", "cycle_id": "1"}))
            .expect("payslip");
        UpdatePayslipStatusTool
            .invoke(store, json!({"payslip_id": "1", "status": "released"}))
            .expect("released");
    }

    #[test]
    fn creates_pending_payment_from_released_payslip() {
        let mut store = fixtures::store();
        released_payslip(&mut store);
        let out = CreatePaymentTool
            .invoke(
                &mut store,
                json!({"employee_id": "2", "payment_method": " Bank Transfer ", "amount": 2020,
                       "cycle_id": "1", "source_payslip_id": "1"}),
            )
            .expect("payment");
        assert_eq!(out["payment_id"], "1");
        assert_eq!(out["payment_method"], "Bank Transfer");
        assert_eq!(out["status"], "pending");
        assert!(out["payment_date"].is_null());
    }

    #[test]
    fn draft_payslip_cannot_back_a_payment() {
        let mut store = fixtures::store();
        CreatePayslipTool
            .invoke(&mut store, json!({"employee_id": "2", "cycle_id": "1"}))
            .expect("payslip");
        let err = CreatePaymentTool
            .invoke(
                &mut store,
                json!({"employee_id": "2", "payment_method": "Check", "amount": 10, "source_payslip_id": "1"}),
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Halt: Source payslip must be in 'released' or 'updated' status"
        );
    }

    #[test]
    fn payment_method_and_amount_are_checked() {
        let mut store = fixtures::store();
        let err = CreatePaymentTool
            .invoke(&mut store, json!({"employee_id": "1", "payment_method": "Cash", "amount": 10}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Halt: Invalid payment method"));

        let err = CreatePaymentTool
            .invoke(&mut store, json!({"employee_id": "1", "payment_method": "Check", "amount": 0}))
            .unwrap_err();
        assert!(err.to_string().contains("amount must be positive"));
    }

    #[test]
    fn update_payment_validates_date() {
        let mut store = fixtures::store();
        CreatePaymentTool
            .invoke(&mut store, json!({"employee_id": "1", "payment_method": "Check", "amount": 10}))
            .expect("payment");

        let err = UpdatePaymentTool
            .invoke(&mut store, json!({"payment_id": "1", "payment_date": "2201-01-01"}))
            .unwrap_err();
        assert!(err.to_string().contains("invalid payment_date"));

        let out = UpdatePaymentTool
            .invoke(
                &mut store,
                json!({"payment_id": 1, "payment_date": "2025-11-20", "status": "completed"}),
            )
            .expect("updated");
        assert_eq!(out["status"], "completed");
        assert_eq!(out["payment_date"], "2025-11-20");
    }

    #[test]
    fn unknown_payment_halts() {
        let mut store = fixtures::store();
        let err = UpdatePaymentTool
            .invoke(&mut store, json!({"payment_id": "7", "status": "failed"}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Halt: Payment not found");
    }
}
