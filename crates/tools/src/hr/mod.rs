//! HR administration: employees, payroll, payslips, payments, on/offboarding.

pub mod calc;
pub mod checklists;
pub mod cycles;
pub mod deductions;
pub mod directory;
pub mod employees;
pub mod offboarding;
pub mod payments;
pub mod payroll;
pub mod payslips;

use crate::lookup;
use crate::{Tool, ToolError};
use opsdesk_core::{Record, RecordExt, Store};
use std::sync::Arc;

pub(crate) const EMPLOYEES: &str = "employees";
pub(crate) const DEPARTMENTS: &str = "departments";
pub(crate) const PAYROLL_CYCLES: &str = "payroll_cycles";
pub(crate) const PAYROLL_INPUTS: &str = "payroll_inputs";
pub(crate) const PAYROLL_EARNINGS: &str = "payroll_earnings";
pub(crate) const DEDUCTIONS: &str = "deductions";
pub(crate) const DEDUCTION_RULES: &str = "deduction_rules";
pub(crate) const PAYSLIPS: &str = "payslips";
pub(crate) const PAYMENTS: &str = "payments";
pub(crate) const CHECKLISTS: &str = "checklists";
pub(crate) const CHECKLIST_TASKS: &str = "checklist_tasks";
pub(crate) const EXIT_CASES: &str = "exit_cases";
pub(crate) const FINANCE_SETTLEMENTS: &str = "finance_settlements";
pub(crate) const EMPLOYEE_ASSETS: &str = "employee_assets";
pub(crate) const BENEFIT_PLANS: &str = "benefit_plans";

pub fn tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(employees::CreateEmployeeTool),
        Arc::new(employees::UpdateEmployeeTool),
        Arc::new(cycles::StartPayrollCycleTool),
        Arc::new(cycles::UpdatePayrollCycleTool),
        Arc::new(cycles::OpenPayrollPeriodTool),
        Arc::new(cycles::GetPayrollDataTool),
        Arc::new(payroll::CreatePayrollInputTool),
        Arc::new(payroll::UpdatePayrollInputTool),
        Arc::new(payroll::CreatePayrollEarningTool),
        Arc::new(payroll::UpdatePayrollEarningTool),
        Arc::new(deductions::CreatePayrollDeductionTool),
        Arc::new(deductions::UpdatePayrollDeductionTool),
        Arc::new(payslips::CreatePayslipTool),
        Arc::new(payslips::UpdatePayslipStatusTool),
        Arc::new(payslips::GetPayslipOrPaymentTool),
        Arc::new(payments::CreatePaymentTool),
        Arc::new(payments::UpdatePaymentTool),
        Arc::new(checklists::CreateOnboardChecklistTool),
        Arc::new(checklists::UpdateOnboardChecklistTool),
        Arc::new(offboarding::CreateOffboardExitTool),
        Arc::new(offboarding::CalculateSettlementTool),
        Arc::new(offboarding::GetSettlementsTool),
        Arc::new(directory::GetAssetsTool),
        Arc::new(directory::GetDepartmentTool),
        Arc::new(directory::UpdateBenefitPlanTool),
    ]
}

/// Employee that exists and is `active`; anything else halts with one message.
pub(crate) fn active_employee<'a>(store: &'a Store, employee_id: &str) -> Result<&'a Record, ToolError> {
    match store.get(EMPLOYEES, employee_id)? {
        Some(employee) if employee.is("status", "active") => Ok(employee),
        _ => Err(ToolError::Halt("Employee not found or inactive".into())),
    }
}

/// Payroll cycle accepting payroll work: `open` or `approved`.
pub(crate) fn workable_cycle<'a>(store: &'a Store, cycle_id: &str) -> Result<&'a Record, ToolError> {
    let cycle = store
        .get(PAYROLL_CYCLES, cycle_id)?
        .ok_or_else(|| ToolError::Halt("Payroll cycle not found".into()))?;
    if !matches!(cycle.str_field("status"), Some("open" | "approved")) {
        return Err(ToolError::Halt(
            "Payroll cycle must be in 'open' or 'approved' status".into(),
        ));
    }
    Ok(cycle)
}

/// Resolve an employee by ID, or by email when no ID is given.
pub(crate) fn resolve_employee_id(
    store: &Store,
    employee_id: Option<&str>,
    email: Option<&str>,
) -> Result<Option<String>, ToolError> {
    if let Some(id) = employee_id {
        lookup::ensure(store, EMPLOYEES, id, "Employee")?;
        return Ok(Some(id.to_string()));
    }
    let Some(email) = email else {
        return Ok(None);
    };
    store
        .records(EMPLOYEES)?
        .find(|(_, e)| e.str_field("email").is_some_and(|m| m.eq_ignore_ascii_case(email)))
        .map(|(id, _)| Some(id.clone()))
        .ok_or_else(|| ToolError::NotFound(format!("Employee with email '{email}' not found")))
}
