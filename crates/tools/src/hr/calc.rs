//! Payroll arithmetic shared by payslips, settlements and input review.

use super::{DEDUCTIONS, PAYROLL_EARNINGS, PAYROLL_INPUTS};
use crate::ToolError;
use opsdesk_core::record::round2;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Serialize;

/// Paid hours per year used to derive an hourly rate from an annual salary.
pub const ANNUAL_PAID_HOURS: f64 = 52.0 * 80.0;

pub const OVERTIME_MULTIPLIER: f64 = 1.5;

/// Percent change above which a payroll input goes to review.
pub const VARIANCE_REVIEW_THRESHOLD: f64 = 1.0;

pub fn hourly_rate(base_salary: f64) -> f64 {
    base_salary / ANNUAL_PAID_HOURS
}

/// The payroll input of an employee for a cycle, if one was entered.
pub fn payroll_input<'a>(
    store: &'a Store,
    employee_id: &str,
    cycle_id: &str,
) -> Result<Option<&'a Record>, ToolError> {
    Ok(store
        .records(PAYROLL_INPUTS)?
        .map(|(_, input)| input)
        .find(|input| input.refers_to("employee_id", employee_id) && input.refers_to("cycle_id", cycle_id)))
}

/// Approved earnings of an employee in a cycle.
pub fn approved_earnings<'a>(
    store: &'a Store,
    employee_id: &str,
    cycle_id: &str,
) -> Result<impl Iterator<Item = &'a Record> + 'a, ToolError> {
    let employee_id = employee_id.to_string();
    let cycle_id = cycle_id.to_string();
    Ok(store.records(PAYROLL_EARNINGS)?.map(|(_, e)| e).filter(move |e| {
        e.refers_to("employee_id", &employee_id)
            && e.refers_to("cycle_id", &cycle_id)
            && e.is("status", "approved")
    }))
}

/// `valid`, active deductions of an employee that apply to a cycle.
/// Deductions without a cycle apply to every cycle.
pub fn deductions_for_cycle<'a>(
    store: &'a Store,
    employee_id: &str,
    cycle_id: &str,
) -> Result<impl Iterator<Item = (&'a String, &'a Record)> + 'a, ToolError> {
    let employee_id = employee_id.to_string();
    let cycle_id = cycle_id.to_string();
    Ok(store.records(DEDUCTIONS)?.filter(move |(_, d)| {
        d.refers_to("employee_id", &employee_id)
            && d.is("status", "valid")
            && d.id_field("cycle_id").map_or(true, |c| c == cycle_id)
            && d.bool_field("is_active").unwrap_or(true)
    }))
}

pub fn valid_deductions(store: &Store, employee_id: &str, cycle_id: &str) -> Result<f64, ToolError> {
    Ok(deductions_for_cycle(store, employee_id, cycle_id)?
        .map(|(_, d)| d.f64_or_zero("amount"))
        .sum())
}

/// Breakdown of one employee's pay for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayCalculation {
    pub base_salary: f64,
    pub hourly_rate: f64,
    pub hours_worked: f64,
    pub overtime_hours: f64,
    pub allowance_amount: f64,
    pub gross_pay: f64,
    pub total_earnings: f64,
    pub total_deductions: f64,
    pub net_pay: f64,
}

impl PayCalculation {
    /// Gross from the payroll input; net adds approved earnings and removes valid deductions.
    /// `net_pay` is left unrounded and may be negative.
    pub fn compute(base_salary: f64, input: &Record, total_earnings: f64, total_deductions: f64) -> Self {
        let rate = hourly_rate(base_salary);
        let hours_worked = input.f64_or_zero("hours_worked");
        let overtime_hours = input.f64_or_zero("overtime_hours");
        let allowance_amount = input.f64_or_zero("allowance_amount");
        let gross_pay = hours_worked * rate + overtime_hours * rate * OVERTIME_MULTIPLIER + allowance_amount;
        Self {
            base_salary,
            hourly_rate: rate,
            hours_worked,
            overtime_hours,
            allowance_amount,
            gross_pay,
            total_earnings,
            total_deductions,
            net_pay: gross_pay + total_earnings - total_deductions,
        }
    }

    /// Load inputs, earnings and deductions for `employee_id` in `cycle_id`.
    /// `Ok(None)` when no payroll input exists.
    pub fn for_cycle(
        store: &Store,
        employee_id: &str,
        cycle_id: &str,
        base_salary: f64,
    ) -> Result<Option<Self>, ToolError> {
        let Some(input) = payroll_input(store, employee_id, cycle_id)? else {
            return Ok(None);
        };
        let earnings: f64 = approved_earnings(store, employee_id, cycle_id)?
            .map(|e| e.f64_or_zero("amount"))
            .sum();
        let deductions = valid_deductions(store, employee_id, cycle_id)?;
        Ok(Some(Self::compute(base_salary, input, earnings, deductions)))
    }

    /// Copy with every amount rounded to cents, for display.
    pub fn rounded(&self) -> Self {
        Self {
            base_salary: self.base_salary,
            hourly_rate: round2(self.hourly_rate),
            hours_worked: self.hours_worked,
            overtime_hours: self.overtime_hours,
            allowance_amount: round2(self.allowance_amount),
            gross_pay: round2(self.gross_pay),
            total_earnings: round2(self.total_earnings),
            total_deductions: round2(self.total_deductions),
            net_pay: round2(self.net_pay),
        }
    }
}

/// Percent change between two totals. A change away from zero counts as 100%.
pub fn variance_percent(old_total: f64, new_total: f64) -> Option<f64> {
    if old_total > 0.0 {
        Some(((new_total - old_total) / old_total).abs() * 100.0)
    } else if new_total > 0.0 {
        Some(100.0)
    } else {
        None
    }
}
