use super::{CHECKLISTS, CHECKLIST_TASKS, EMPLOYEES};
use crate::args::{self, opt_id};
use crate::validate::one_of;
use crate::{Tool, ToolError};
use opsdesk_core::ids::{next_numeric_id, task_id};
use opsdesk_core::record::value_id;
use opsdesk_core::{Record, RecordExt, Store, Table};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const CHECKLIST_STATUSES: &[&str] = &["pending", "completed"];
const TASK_STATUSES: &[&str] = &["pending", "completed"];

/// Tasks an onboarding checklist may contain.
pub const ONBOARDING_TASKS: &[&str] = &[
    "IT Equipment Setup",
    "System Access Provisioning",
    "HR Policy Review",
    "Benefits Enrollment Complete",
    "Account Creation & Credentials Setup",
    "HR Documentation & Compliance Forms",
    "Benefits Enrollment Kickoff",
    "Payroll Setup & Bank Verification",
    "Orientation & Welcome Session Scheduling",
    "Manager Introduction & Team Access Setup",
    "Mandatory Training Assignments (Security, Compliance, Code of Conduct)",
    "Workstation/Workspace Preparation",
    "Badge/ID Card Generation",
    "Collect Personal Information",
    "Complete Tax Forms (W-4, State)",
    "Verify I-9 Documents",
    "I-9 Section 1 – Employee",
    "I-9 Section 2 – Employer",
    "Upload ID & Eligibility Documents",
    "Direct Deposit Setup",
    "Review Employee Handbook",
    "Sign Policies",
    "Assign Equipment",
    "Configure Payroll Profile",
    "Complete Benefits Enrollment",
    "Verify Benefit Eligibility Docs",
    "Complete Background Check",
    "Drug Screening",
    "Send Welcome Email",
    "Manager Introduction",
    "Team Introduction",
    "Required Training Assigned",
    "Safety Training",
    "IT/Security Training",
    "Email Setup",
    "Badge/ID Activation",
    "Workstation Setup",
    "Set 30/60/90 Day Goals",
    "First Week Tasks",
    "30-Day Check-in",
    "90-Day Check-in",
];

/// Position for the next `task_<n>` key.
fn next_task_position(tasks: &Table) -> usize {
    tasks
        .keys()
        .filter_map(|k| k.strip_prefix("task_")?.parse::<usize>().ok())
        .max()
        .unwrap_or(0)
        .max(tasks.len())
        + 1
}

/// Task names arrive as a JSON list, or as a string holding one.
fn decode_task_names(value: Option<Value>) -> Result<Vec<String>, ToolError> {
    let value = match value {
        Some(Value::String(raw)) => serde_json::from_str(&raw)
            .map_err(|_| ToolError::InvalidArgs("task_names must be a list".into()))?,
        Some(value) => value,
        None => Value::Array(Vec::new()),
    };
    serde_json::from_value(value).map_err(|_| ToolError::InvalidArgs("task_names must be a list".into()))
}

#[derive(Deserialize)]
struct CreateChecklistArgs {
    #[serde(default, deserialize_with = "opt_id")]
    employee_id: Option<String>,
    task_names: Option<Value>,
}

pub struct CreateOnboardChecklistTool;

impl Tool for CreateOnboardChecklistTool {
    fn name(&self) -> &str {
        "create_onboard_checklist"
    }

    fn description(&self) -> &str {
        "Create the onboarding checklist of an employee with tasks from the predefined onboarding catalog."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "employee_id": {"type": "string"},
                "task_names": {
                    "type": "array",
                    "items": {"type": "string", "enum": ONBOARDING_TASKS},
                    "minItems": 1
                }
            },
            "required": ["employee_id", "task_names"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[EMPLOYEES, CHECKLISTS, CHECKLIST_TASKS])?;
        let args: CreateChecklistArgs = args::parse(args)?;
        let task_names = decode_task_names(args.task_names)?;
        let employee_id = args::required("employee_id", args.employee_id)?;
        if !store.contains(EMPLOYEES, &employee_id)? {
            return Err(ToolError::NotFound(format!("Employee {employee_id} not found")));
        }
        let exists = store.records(CHECKLISTS)?.any(|(_, c)| {
            c.refers_to("employee_id", &employee_id) && c.is("checklist_type", "onboarding")
        });
        if exists {
            return Err(ToolError::Conflict(format!(
                "Onboarding checklist already exists for employee {employee_id}"
            )));
        }
        if task_names.is_empty() {
            return Err(ToolError::InvalidArgs(
                "At least one task must be provided for the onboarding checklist".into(),
            ));
        }
        if let Some(bad) = task_names.iter().find(|t| !ONBOARDING_TASKS.contains(&t.as_str())) {
            return Err(ToolError::InvalidArgs(format!(
                "Invalid task name '{bad}'. Must be one of the predefined onboarding checklist tasks."
            )));
        }

        let checklist_id = next_numeric_id(store.table(CHECKLISTS)?);
        let now = store.now();
        let checklist = json!({
            "checklist_id": checklist_id,
            "checklist_type": "onboarding",
            "employee_id": employee_id,
            "status": "pending",
            "created_at": now,
            "last_updated": now
        });
        store.insert(CHECKLISTS, &checklist_id, checklist.as_object().cloned().unwrap_or_default())?;

        let tasks = store.table_mut(CHECKLIST_TASKS)?;
        let mut created = Vec::with_capacity(task_names.len());
        for name in task_names {
            let id = task_id(next_task_position(tasks));
            let task = json!({
                "task_id": id,
                "checklist_id": checklist_id,
                "name": name,
                "due_date": null,
                "assigned_manager_id": null,
                "status": "pending",
                "created_at": now,
                "last_updated": now
            });
            tasks.insert(id, task.clone());
            created.push(task);
        }
        info!(checklist_id = %checklist_id, tasks = created.len(), "Onboarding checklist created");

        Ok(json!({
            "success": true,
            "message": format!("Onboarding checklist created successfully for employee {employee_id}"),
            "checklist_id": checklist_id,
            "checklist_data": checklist,
            "tasks": created
        }))
    }
}

#[derive(Deserialize)]
struct UpdateChecklistArgs {
    #[serde(default, deserialize_with = "opt_id")]
    checklist_id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    task_updates: Vec<Map<String, Value>>,
}

/// One validated task change. Outer `None` leaves a field alone; inner `None` clears it.
struct TaskChange {
    task_id: String,
    due_date: Option<Value>,
    assigned_manager_id: Option<Value>,
    status: Option<String>,
}

fn validate_task_update(
    store: &Store,
    checklist_id: &str,
    update: &Map<String, Value>,
) -> Result<TaskChange, ToolError> {
    let task_id = update
        .get("task_id")
        .and_then(value_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ToolError::InvalidArgs("Each task update must include 'task_id'".into()))?;
    let task = store
        .get(CHECKLIST_TASKS, &task_id)?
        .ok_or_else(|| ToolError::NotFound(format!("Task {task_id} not found")))?;
    if !task.refers_to("checklist_id", checklist_id) {
        return Err(ToolError::Rejected(format!(
            "Task {task_id} does not belong to checklist {checklist_id}"
        )));
    }

    let assigned_manager_id = update.get("assigned_manager_id").cloned();
    if let Some(manager_id) = assigned_manager_id.as_ref().and_then(value_id).filter(|m| !m.is_empty()) {
        let manager = store
            .get(EMPLOYEES, &manager_id)?
            .ok_or_else(|| ToolError::NotFound(format!("Manager {manager_id} not found")))?;
        if !manager.is("status", "active") {
            return Err(ToolError::Rejected(format!("Manager {manager_id} is not active")));
        }
    }

    let status = match update.get("status") {
        None => None,
        Some(value) => {
            let status = value.as_str().unwrap_or_default();
            one_of("task status", status, TASK_STATUSES)?;
            Some(status.to_string())
        }
    };

    Ok(TaskChange {
        task_id,
        due_date: update.get("due_date").cloned(),
        assigned_manager_id,
        status,
    })
}

fn checklist_tasks(store: &Store, checklist_id: &str) -> Result<Vec<Value>, ToolError> {
    Ok(store
        .records(CHECKLIST_TASKS)?
        .filter(|(_, t)| t.refers_to("checklist_id", checklist_id))
        .map(|(id, t)| {
            let mut task = t.clone();
            task.insert("task_id".into(), json!(id));
            Value::Object(task)
        })
        .collect())
}

pub struct UpdateOnboardChecklistTool;

impl Tool for UpdateOnboardChecklistTool {
    fn name(&self) -> &str {
        "update_onboard_checklist"
    }

    fn description(&self) -> &str {
        "Update an onboarding checklist's status and its tasks (due date, assigned manager, status). \
         A checklist can only be completed once every task is completed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "checklist_id": {"type": "string"},
                "status": {"type": "string", "enum": CHECKLIST_STATUSES},
                "task_updates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "task_id": {"type": "string"},
                            "due_date": {"type": "string"},
                            "assigned_manager_id": {"type": "string", "description": "Active employee."},
                            "status": {"type": "string", "enum": TASK_STATUSES}
                        },
                        "required": ["task_id"]
                    }
                }
            },
            "required": ["checklist_id"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[CHECKLISTS, CHECKLIST_TASKS, EMPLOYEES])?;
        let args: UpdateChecklistArgs = args::parse(args)?;
        let checklist_id = args::required("checklist_id", args.checklist_id)?;
        let checklist = store
            .get(CHECKLISTS, &checklist_id)?
            .ok_or_else(|| ToolError::NotFound(format!("Onboarding checklist {checklist_id} not found")))?;
        if !checklist.is("checklist_type", "onboarding") {
            return Err(ToolError::Rejected(format!(
                "Checklist {checklist_id} is not an onboarding checklist"
            )));
        }
        if let Some(status) = args.status.as_deref() {
            one_of("status", status, CHECKLIST_STATUSES)?;
        }

        // Validate every change before touching the store.
        let changes = args
            .task_updates
            .iter()
            .map(|update| validate_task_update(store, &checklist_id, update))
            .collect::<Result<Vec<_>, _>>()?;

        if args.status.as_deref() == Some("completed") {
            let all_done = store
                .records(CHECKLIST_TASKS)?
                .filter(|(_, t)| t.refers_to("checklist_id", &checklist_id))
                .all(|(id, t)| {
                    let pending_change = changes.iter().rev().find(|c| &c.task_id == id);
                    match pending_change.and_then(|c| c.status.as_deref()) {
                        Some(status) => status == "completed",
                        None => t.is("status", "completed"),
                    }
                });
            if !all_done {
                return Err(ToolError::Rejected(
                    "Cannot set checklist status to 'completed'. Not all tasks are completed.".into(),
                ));
            }
        }

        let now = store.now();
        let mut updated_tasks = Vec::with_capacity(changes.len());
        for change in changes {
            let Some(task) = store.get_mut(CHECKLIST_TASKS, &change.task_id)? else {
                continue;
            };
            if let Some(due_date) = change.due_date {
                task.insert("due_date".into(), due_date);
            }
            if let Some(manager_id) = change.assigned_manager_id {
                task.insert("assigned_manager_id".into(), manager_id);
            }
            if let Some(status) = change.status {
                task.insert("status".into(), json!(status));
            }
            task.insert("last_updated".into(), json!(now));
            updated_tasks.push(Value::Object(task.clone()));
        }

        let checklist: &mut Record = store
            .get_mut(CHECKLISTS, &checklist_id)?
            .ok_or_else(|| ToolError::NotFound(format!("Onboarding checklist {checklist_id} not found")))?;
        if let Some(status) = args.status {
            checklist.insert("status".into(), json!(status));
            checklist.insert("last_updated".into(), json!(now));
        }
        let checklist = checklist.clone();
        info!(checklist_id = %checklist_id, tasks = updated_tasks.len(), "Onboarding checklist updated");

        Ok(json!({
            "success": true,
            "message": format!("Onboarding checklist {checklist_id} updated successfully"),
            "checklist_data": checklist,
            "updated_tasks": updated_tasks,
            "all_tasks": checklist_tasks(store, &checklist_id)?
        }))
    }
}
