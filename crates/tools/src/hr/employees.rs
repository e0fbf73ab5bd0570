use super::{DEPARTMENTS, EMPLOYEES};
use crate::args::{self, opt_id};
use crate::validate::one_of;
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const EMPLOYEE_STATUSES: &[&str] = &["active", "inactive", "probation"];

/// Review flags carried on every employee record.
#[derive(Deserialize, Default)]
struct EmployeeFlags {
    flag_financial_counseling_recommended: Option<bool>,
    flag_potential_overtime_violation: Option<bool>,
    flag_requires_payroll_review: Option<bool>,
    flag_high_offboard_risk: Option<bool>,
    flag_pending_settlement: Option<bool>,
    flag_requires_finance_approval: Option<bool>,
}

impl EmployeeFlags {
    fn entries(&self) -> [(&'static str, Option<bool>); 6] {
        [
            ("flag_financial_counseling_recommended", self.flag_financial_counseling_recommended),
            ("flag_potential_overtime_violation", self.flag_potential_overtime_violation),
            ("flag_requires_payroll_review", self.flag_requires_payroll_review),
            ("flag_high_offboard_risk", self.flag_high_offboard_risk),
            ("flag_pending_settlement", self.flag_pending_settlement),
            ("flag_requires_finance_approval", self.flag_requires_finance_approval),
        ]
    }
}

#[derive(Deserialize)]
struct EmployeeArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    manager_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    department_id: Option<String>,
    start_date: Option<String>,
    full_name: Option<String>,
    email: Option<String>,
    status: Option<String>,
    tenure_months: Option<i64>,
    performance_rating: Option<i64>,
    base_salary: Option<f64>,
    #[serde(flatten)]
    flags: EmployeeFlags,
}

/// Checks shared by create and update. `self_id` is excluded from the email uniqueness scan.
fn validate_employee(store: &Store, args: &EmployeeArgs, self_id: Option<&str>) -> Result<(), ToolError> {
    if let Some(department_id) = args.department_id.as_deref() {
        if !store.contains(DEPARTMENTS, department_id)? {
            return Err(ToolError::NotFound(format!(
                "Department with ID '{department_id}' not found"
            )));
        }
    }
    if let Some(manager_id) = args.manager_id.as_deref().filter(|m| !m.is_empty()) {
        if !store.contains(EMPLOYEES, manager_id)? {
            return Err(ToolError::NotFound(format!("Manager with ID '{manager_id}' not found")));
        }
    }
    if let Some(email) = args.email.as_deref() {
        let taken = store
            .records(EMPLOYEES)?
            .any(|(id, e)| Some(id.as_str()) != self_id && e.is("email", email));
        if taken {
            return Err(ToolError::Conflict(format!(
                "Employee with email '{email}' already exists"
            )));
        }
    }
    if let Some(status) = args.status.as_deref() {
        one_of("status", status, EMPLOYEE_STATUSES)?;
    }
    if args.performance_rating.is_some_and(|r| !(1..=5).contains(&r)) {
        return Err(ToolError::InvalidArgs(
            "Performance rating must be between 1 and 5".into(),
        ));
    }
    if args.base_salary.is_some_and(|s| s <= 0.0) {
        return Err(ToolError::InvalidArgs("Base salary must be greater than 0".into()));
    }
    if args.tenure_months.is_some_and(|t| t < 0) {
        return Err(ToolError::InvalidArgs("tenure_months must be non-negative".into()));
    }
    Ok(())
}

pub struct CreateEmployeeTool;

impl Tool for CreateEmployeeTool {
    fn name(&self) -> &str {
        "create_employee"
    }

    fn description(&self) -> &str {
        "Create a new employee record after validating department, manager, unique email, status, rating and salary."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "department_id": {"type": "string", "description": "Department the employee joins."},
                "manager_id": {"type": "string", "description": "Optional manager (existing employee)."},
                "start_date": {"type": "string", "description": "Start date, YYYY-MM-DD."},
                "full_name": {"type": "string"},
                "email": {"type": "string", "description": "Must be unique across employees."},
                "status": {"type": "string", "enum": EMPLOYEE_STATUSES, "description": "Defaults to active."},
                "tenure_months": {"type": "integer", "minimum": 0},
                "performance_rating": {"type": "integer", "minimum": 1, "maximum": 5},
                "base_salary": {"type": "number", "description": "Annual base salary, greater than 0."},
                "flag_financial_counseling_recommended": {"type": "boolean"},
                "flag_potential_overtime_violation": {"type": "boolean"},
                "flag_requires_payroll_review": {"type": "boolean"},
                "flag_high_offboard_risk": {"type": "boolean"},
                "flag_pending_settlement": {"type": "boolean"},
                "flag_requires_finance_approval": {"type": "boolean"}
            },
            "required": ["department_id", "start_date", "full_name", "email", "base_salary"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[EMPLOYEES, DEPARTMENTS])?;
        let mut args: EmployeeArgs = args::parse(args)?;

        let (Some(department_id), Some(start_date), Some(full_name), Some(email), Some(base_salary)) = (
            args.department_id.clone().filter(|s| !s.is_empty()),
            args.start_date.take().filter(|s| !s.is_empty()),
            args.full_name.take().filter(|s| !s.is_empty()),
            args.email.clone().filter(|s| !s.is_empty()),
            args.base_salary,
        ) else {
            return Err(ToolError::InvalidArgs(
                "Missing required parameters. Required: department_id, start_date, full_name, email, base_salary".into(),
            ));
        };
        args.status.get_or_insert_with(|| "active".to_string());
        validate_employee(store, &args, None)?;

        let employee_id = next_numeric_id(store.table(EMPLOYEES)?);
        let now = store.now();
        let mut employee = Record::new();
        employee.insert("employee_id".into(), json!(employee_id));
        employee.insert("manager_id".into(), json!(args.manager_id));
        employee.insert("department_id".into(), json!(department_id));
        employee.insert("start_date".into(), json!(start_date));
        employee.insert("full_name".into(), json!(full_name));
        employee.insert("email".into(), json!(email));
        employee.insert("status".into(), json!(args.status));
        employee.insert("tenure_months".into(), json!(args.tenure_months));
        employee.insert("performance_rating".into(), json!(args.performance_rating));
        employee.insert("base_salary".into(), json!(base_salary));
        for (flag, value) in args.flags.entries() {
            employee.insert(flag.into(), json!(value.unwrap_or(false)));
        }
        employee.insert("created_at".into(), json!(now));
        employee.insert("last_updated".into(), json!(now));

        store.insert(EMPLOYEES, &employee_id, employee.clone())?;
        info!(employee_id = %employee_id, "Employee created");

        Ok(json!({
            "success": true,
            "message": format!("Employee {employee_id} created successfully"),
            "employee_data": employee
        }))
    }
}

pub struct UpdateEmployeeTool;

impl Tool for UpdateEmployeeTool {
    fn name(&self) -> &str {
        "update_employee"
    }

    fn description(&self) -> &str {
        "Update fields of an existing employee. Only provided fields change."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "department_id": {"type": "string"},
                "manager_id": {"type": "string"},
                "start_date": {"type": "string"},
                "full_name": {"type": "string"},
                "email": {"type": "string"},
                "status": {"type": "string", "enum": EMPLOYEE_STATUSES},
                "tenure_months": {"type": "integer", "minimum": 0},
                "performance_rating": {"type": "integer", "minimum": 1, "maximum": 5},
                "base_salary": {"type": "number"},
                "flag_financial_counseling_recommended": {"type": "boolean"},
                "flag_potential_overtime_violation": {"type": "boolean"},
                "flag_requires_payroll_review": {"type": "boolean"},
                "flag_high_offboard_risk": {"type": "boolean"},
                "flag_pending_settlement": {"type": "boolean"},
                "flag_requires_finance_approval": {"type": "boolean"}
            },
            "required": ["employee_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[EMPLOYEES, DEPARTMENTS])?;
        let args: EmployeeArgs = args::parse(args)?;
        let employee_id = args
            .employee_id
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArgs("Missing required parameter: employee_id".into()))?;
        lookup::ensure(store, EMPLOYEES, &employee_id, "Employee")?;
        validate_employee(store, &args, Some(&employee_id))?;

        let now = store.now();
        let employee = lookup::record_mut(store, EMPLOYEES, &employee_id, "Employee")?;
        let text_fields = [
            ("manager_id", &args.manager_id),
            ("department_id", &args.department_id),
            ("start_date", &args.start_date),
            ("full_name", &args.full_name),
            ("email", &args.email),
            ("status", &args.status),
        ];
        for (field, value) in text_fields {
            if let Some(value) = value {
                employee.insert(field.into(), json!(value));
            }
        }
        if let Some(tenure) = args.tenure_months {
            employee.insert("tenure_months".into(), json!(tenure));
        }
        if let Some(rating) = args.performance_rating {
            employee.insert("performance_rating".into(), json!(rating));
        }
        if let Some(salary) = args.base_salary {
            employee.insert("base_salary".into(), json!(salary));
        }
        for (flag, value) in args.flags.entries() {
            if let Some(value) = value {
                employee.insert(flag.into(), json!(value));
            }
        }
        employee.insert("last_updated".into(), json!(now));
        let snapshot = employee.clone();
        info!(employee_id = %employee_id, "Employee updated");

        Ok(json!({
            "success": true,
            "message": format!("Employee {employee_id} updated successfully"),
            "employee_data": snapshot
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hr::fixtures;

    fn new_hire() -> Value {
        json!({
            "department_id": "1",
            "start_date": "2025-12-01",
            "full_name": "Lena Park",
            "email": "lena@corp.test",
            "base_salary": 90000,
            "performance_rating": 4
        })
    }

    #[test]
    fn creates_employee_with_defaults() {
        let mut store = fixtures::store();
        let out = CreateEmployeeTool.invoke(&mut store, new_hire()).expect("created");

        assert_eq!(out["message"], "Employee 4 created successfully");
        let employee = &out["employee_data"];
        assert_eq!(employee["status"], "active");
        assert_eq!(employee["flag_pending_settlement"], false);
        assert_eq!(employee["created_at"], "2025-11-16T23:59:00");
        assert!(store.contains(EMPLOYEES, "4").expect("lookup"));
    }

    #[test]
    fn rejects_duplicate_email() {
        let mut store = fixtures::store();
        let mut args = new_hire();
        args["email"] = json!("grace@corp.test");
        let err = CreateEmployeeTool.invoke(&mut store, args).unwrap_err();
        assert_eq!(err.to_string(), "Employee with email 'grace@corp.test' already exists");
    }

    #[test]
    fn rejects_unknown_department_and_bad_rating() {
        let mut store = fixtures::store();
        let mut args = new_hire();
        args["department_id"] = json!("99");
        let err = CreateEmployeeTool.invoke(&mut store, args).unwrap_err();
        assert_eq!(err.to_string(), "Department with ID '99' not found");

        let mut args = new_hire();
        args["performance_rating"] = json!(7);
        assert!(CreateEmployeeTool.invoke(&mut store, args).is_err());
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let mut store = fixtures::store();
        let err = CreateEmployeeTool
            .invoke(&mut store, json!({"full_name": "No Salary"}))
            .unwrap_err();
        assert!(err.to_string().starts_with("Missing required parameters"));
    }

    #[test]
    fn update_keeps_own_email_and_sets_flags() {
        let mut store = fixtures::store();
        let out = UpdateEmployeeTool
            .invoke(
                &mut store,
                json!({"employee_id": 2, "email": "omar@corp.test", "flag_high_offboard_risk": true}),
            )
            .expect("updated");
        assert_eq!(out["employee_data"]["flag_high_offboard_risk"], true);
        assert_eq!(out["employee_data"]["full_name"], "Omar Diaz");
    }

    #[test]
    fn update_rejects_invalid_status() {
        let mut store = fixtures::store();
        let err = UpdateEmployeeTool
            .invoke(&mut store, json!({"employee_id": "1", "status": "retired"}))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid status. Must be one of: active, inactive, probation"
        );
    }
}
