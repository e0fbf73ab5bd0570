use super::{PAYROLL_CYCLES, PAYROLL_EARNINGS, PAYROLL_INPUTS};
use crate::args::{self, opt_id};
use crate::validate::{date, one_of, opt_one_of};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::record::value_id;
use opsdesk_core::{RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::info;

const CYCLE_STATUSES: &[&str] = &["open", "closed"];
const PAYROLL_ENTITIES: &[&str] = &["payroll_cycles", "payroll_inputs", "payroll_earnings"];

/// Reject a `start..=end` range that shares a day with any other cycle.
fn ensure_no_overlap(store: &Store, except: Option<&str>, start: &str, end: &str) -> Result<(), ToolError> {
    for (cycle_id, cycle) in store.records(PAYROLL_CYCLES)? {
        if except == Some(cycle_id.as_str()) {
            continue;
        }
        let (Some(existing_start), Some(existing_end)) =
            (cycle.str_field("start_date"), cycle.str_field("end_date"))
        else {
            continue;
        };
        if existing_start == start && existing_end == end {
            return Err(ToolError::Conflict(format!(
                "Another payroll cycle ('{cycle_id}') already exists with the same start_date and end_date"
            )));
        }
        if start <= existing_end && end >= existing_start {
            return Err(ToolError::Conflict(format!(
                "Payroll cycle dates overlap with existing cycle '{cycle_id}' \
                 (existing: {existing_start} to {existing_end}, new: {start} to {end})"
            )));
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct StartCycleArgs {
    start_date: Option<String>,
    end_date: Option<String>,
    frequency: Option<String>,
    status: Option<String>,
}

pub struct StartPayrollCycleTool;

impl Tool for StartPayrollCycleTool {
    fn name(&self) -> &str {
        "start_payroll_cycle"
    }

    fn description(&self) -> &str {
        "Create a payroll cycle for a date range that does not overlap any existing cycle."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "start_date": {"type": "string", "description": "YYYY-MM-DD"},
                "end_date": {"type": "string", "description": "YYYY-MM-DD, after start_date"},
                "frequency": {"type": "string", "description": "e.g. weekly, biweekly, monthly"},
                "status": {"type": "string", "enum": CYCLE_STATUSES, "default": "open"}
            },
            "required": ["start_date", "end_date", "frequency"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYROLL_CYCLES])?;
        let args: StartCycleArgs = args::parse(args)?;
        let status = args.status.unwrap_or_else(|| "open".to_string());
        one_of("status", &status, CYCLE_STATUSES)?;
        let start_date = args::required_str("start_date", args.start_date)?;
        let end_date = args::required_str("end_date", args.end_date)?;
        let frequency = args::required_str("frequency", args.frequency)?;
        if date("start_date", &start_date)? >= date("end_date", &end_date)? {
            return Err(ToolError::InvalidArgs("end_date must be after start_date".into()));
        }

        ensure_no_overlap(store, None, &start_date, &end_date)?;

        let cycle_id = next_numeric_id(store.table(PAYROLL_CYCLES)?);
        let now = store.now();
        let cycle = json!({
            "cycle_id": cycle_id,
            "start_date": start_date,
            "end_date": end_date,
            "frequency": frequency,
            "status": status,
            "created_at": now,
            "last_updated": now
        });
        store.insert(PAYROLL_CYCLES, &cycle_id, cycle.as_object().cloned().unwrap_or_default())?;
        info!(cycle_id = %cycle_id, "Payroll cycle started");

        Ok(json!({
            "success": true,
            "payroll_cycle": cycle,
            "message": format!("Payroll cycle created successfully with ID: {cycle_id}")
        }))
    }
}

#[derive(Deserialize)]
struct UpdateCycleArgs {
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    frequency: Option<String>,
    status: Option<String>,
}

pub struct UpdatePayrollCycleTool;

impl Tool for UpdatePayrollCycleTool {
    fn name(&self) -> &str {
        "update_payroll_cycle"
    }

    fn description(&self) -> &str {
        "Update dates, frequency or status of a payroll cycle. New dates may not overlap another cycle."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cycle_id": {"type": "string"},
                "start_date": {"type": "string"},
                "end_date": {"type": "string"},
                "frequency": {"type": "string"},
                "status": {"type": "string", "enum": CYCLE_STATUSES}
            },
            "required": ["cycle_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYROLL_CYCLES])?;
        let args: UpdateCycleArgs = args::parse(args)?;
        let cycle_id = args::required("cycle_id", args.cycle_id)?;
        let current = lookup::record(store, PAYROLL_CYCLES, &cycle_id, "Payroll cycle")?;
        if args.start_date.is_none()
            && args.end_date.is_none()
            && args.frequency.is_none()
            && args.status.is_none()
        {
            return Err(ToolError::InvalidArgs(
                "No fields provided to update. Provide at least one field".into(),
            ));
        }
        opt_one_of("status", args.status.as_deref(), CYCLE_STATUSES)?;

        let new_start = args
            .start_date
            .as_deref()
            .or_else(|| current.str_field("start_date"))
            .unwrap_or_default()
            .to_string();
        let new_end = args
            .end_date
            .as_deref()
            .or_else(|| current.str_field("end_date"))
            .unwrap_or_default()
            .to_string();
        if date("start_date", &new_start)? > date("end_date", &new_end)? {
            return Err(ToolError::InvalidArgs(
                "Invalid date range: start_date cannot be after end_date".into(),
            ));
        }
        if args.start_date.is_some() || args.end_date.is_some() {
            ensure_no_overlap(store, Some(&cycle_id), &new_start, &new_end)?;
        }

        let now = store.now();
        let cycle = lookup::record_mut(store, PAYROLL_CYCLES, &cycle_id, "Payroll cycle")?;
        for (field, value) in [
            ("start_date", args.start_date),
            ("end_date", args.end_date),
            ("frequency", args.frequency),
            ("status", args.status),
        ] {
            if let Some(value) = value {
                cycle.insert(field.into(), json!(value));
            }
        }
        cycle.insert("last_updated".into(), json!(now));
        info!(cycle_id = %cycle_id, "Payroll cycle updated");
        Ok(Value::Object(cycle.clone()))
    }
}

#[derive(Deserialize)]
struct PeriodArgs {
    #[serde(default, deserialize_with = "opt_id")]
    cycle_id: Option<String>,
    status: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

pub struct OpenPayrollPeriodTool;

impl Tool for OpenPayrollPeriodTool {
    fn name(&self) -> &str {
        "open_payroll_period"
    }

    fn description(&self) -> &str {
        "Look up payroll cycles: one by ID, or filtered by status and date window. \
         Without filters only open cycles are returned."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cycle_id": {"type": "string"},
                "status": {"type": "string", "description": "e.g. open, approved, closed"},
                "start_date": {"type": "string", "description": "YYYY-MM-DD"},
                "end_date": {"type": "string", "description": "YYYY-MM-DD"}
            }
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[PAYROLL_CYCLES])?;
        let args: PeriodArgs = args::parse(args)?;
        if let Some(cycle_id) = args.cycle_id.filter(|c| !c.is_empty()) {
            let cycle = lookup::record(store, PAYROLL_CYCLES, &cycle_id, "Payroll cycle")?;
            return Ok(json!({"success": true, "cycle": cycle}));
        }

        let unfiltered = args.status.is_none() && args.start_date.is_none() && args.end_date.is_none();
        let start = args.start_date.as_deref();
        let end = args.end_date.as_deref();
        let cycles: Vec<Value> = store
            .records(PAYROLL_CYCLES)?
            .map(|(_, cycle)| cycle)
            .filter(|cycle| {
                if unfiltered {
                    return cycle.is("status", "open");
                }
                if args.status.as_deref().is_some_and(|s| !cycle.is("status", s)) {
                    return false;
                }
                let (Some(cycle_start), Some(cycle_end)) =
                    (cycle.str_field("start_date"), cycle.str_field("end_date"))
                else {
                    return true;
                };
                match (start, end) {
                    (Some(s), Some(e)) => cycle_start <= e && s <= cycle_end,
                    (Some(s), None) => cycle_start <= s && s <= cycle_end,
                    (None, Some(e)) => cycle_start <= e && e <= cycle_end,
                    (None, None) => true,
                }
            })
            .map(|cycle| Value::Object(cycle.clone()))
            .collect();

        if cycles.is_empty() {
            let mut described = Vec::new();
            if let Some(s) = &args.status {
                described.push(format!("status='{s}'"));
            }
            if let Some(s) = start {
                described.push(format!("start_date='{s}'"));
            }
            if let Some(e) = end {
                described.push(format!("end_date='{e}'"));
            }
            let message = if described.is_empty() {
                "No open payroll cycles found".to_string()
            } else {
                format!("No payroll cycles found with {}", described.join(", "))
            };
            return Ok(json!({"success": true, "count": 0, "cycles": [], "message": message}));
        }

        Ok(json!({"success": true, "count": cycles.len(), "cycles": cycles}))
    }
}

#[derive(Deserialize)]
struct PayrollDataArgs {
    entity_type: Option<String>,
    filters: Option<Value>,
}

pub struct GetPayrollDataTool;

impl Tool for GetPayrollDataTool {
    fn name(&self) -> &str {
        "get_payroll_data"
    }

    fn description(&self) -> &str {
        "Retrieve payroll cycles, inputs or earnings with optional equality filters. \
         Cycles can be filtered by employee_id through the employee's inputs and earnings."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_type": {"type": "string", "enum": PAYROLL_ENTITIES},
                "filters": {"type": "object", "description": "Field/value pairs that must match exactly."}
            },
            "required": ["entity_type"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        let args: PayrollDataArgs = args::parse(args)?;
        let entity_type = args.entity_type.unwrap_or_default();
        one_of("entity_type", &entity_type, PAYROLL_ENTITIES)?;
        let mut filters: Map<String, Value> = match args.filters {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ToolError::InvalidArgs(
                    "filters must be a JSON object if provided".into(),
                ))
            }
        };
        store.check_tables(&[entity_type.as_str()])?;

        let id_field = match entity_type.as_str() {
            "payroll_cycles" => "cycle_id",
            "payroll_inputs" => "input_id",
            _ => "earning_id",
        };

        let employee_cycles = if entity_type == PAYROLL_CYCLES {
            filters
                .remove("employee_id")
                .and_then(|v| value_id(&v))
                .map(|employee_id| cycles_for_employee(store, &employee_id))
                .transpose()?
        } else {
            None
        };

        let results: Vec<Value> = lookup::filter_records(store, &entity_type, id_field, &filters)?
            .into_iter()
            .filter(|row| match &employee_cycles {
                Some(allowed) => row
                    .get(id_field)
                    .and_then(value_id)
                    .is_some_and(|id| allowed.contains(&id)),
                None => true,
            })
            .collect();

        Ok(json!({
            "entity_type": entity_type,
            "count": results.len(),
            "results": results
        }))
    }
}

/// Cycles in which an employee has payroll inputs or earnings.
fn cycles_for_employee(store: &Store, employee_id: &str) -> Result<HashSet<String>, ToolError> {
    let mut cycles = HashSet::new();
    for table in [PAYROLL_INPUTS, PAYROLL_EARNINGS] {
        for (_, row) in store.records(table)? {
            if row.refers_to("employee_id", employee_id) {
                if let Some(cycle_id) = row.id_field("cycle_id") {
                    cycles.insert(cycle_id);
                }
            }
        }
    }
    Ok(cycles)
}
