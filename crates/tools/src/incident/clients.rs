//! Clients and the SLA agreements that set their resolution tier.

use super::sla::SLA_TIERS;
use super::{CLIENTS, SLA_AGREEMENTS};
use crate::args::{self, opt_id, Action};
use crate::validate::{self, one_of};
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const CLIENT_TYPES: &[&str] = &["enterprise", "mid_market", "small_business", "startup"];
const CLIENT_STATUSES: &[&str] = &["active", "inactive", "suspended"];
const CLIENT_FIELDS: &[&str] = &[
    "client_name",
    "client_type",
    "country",
    "registration_number",
    "contact_email",
    "industry",
    "status",
];

const SLA_STATUSES: &[&str] = &["active", "expired", "cancelled"];
const SLA_CREATE_FIELDS: &[&str] = &["client_id", "tier", "status", "start_date", "end_date"];
const SLA_UPDATE_FIELDS: &[&str] = &["tier", "status", "start_date", "end_date"];

/// Another client already holds `value` in `field`.
fn client_value_taken(store: &Store, field: &str, value: &str, except: Option<&str>) -> Result<bool, ToolError> {
    Ok(store
        .records(CLIENTS)?
        .any(|(id, c)| Some(id.as_str()) != except && c.is(field, value)))
}

fn check_client_enums(data: &Record) -> Result<(), ToolError> {
    if let Some(client_type) = data.get("client_type") {
        one_of("client_type", client_type.as_str().unwrap_or_default(), CLIENT_TYPES)?;
    }
    if let Some(status) = data.get("status") {
        one_of("status", status.as_str().unwrap_or_default(), CLIENT_STATUSES)?;
    }
    Ok(())
}

fn check_client_uniqueness(store: &Store, data: &Record, except: Option<&str>) -> Result<(), ToolError> {
    if let Some(name) = data.str_field("client_name") {
        if client_value_taken(store, "client_name", name, except)? {
            return Err(ToolError::Conflict(format!("Client name '{name}' already exists")));
        }
    }
    if let Some(number) = data.str_field("registration_number").filter(|n| !n.is_empty()) {
        if client_value_taken(store, "registration_number", number, except)? {
            return Err(ToolError::Conflict(format!(
                "Registration number '{number}' already exists"
            )));
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct ManageClientArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    client_id: Option<String>,
    client_data: Option<Map<String, Value>>,
}

pub struct ManageClientsTool;

impl ManageClientsTool {
    fn create(&self, store: &mut Store, data: Map<String, Value>) -> Result<Value, ToolError> {
        let payload = Value::Object(data.clone());
        let missing = args::missing_fields(&payload, &["client_name", "client_type", "country"]);
        if !missing.is_empty() {
            return Err(ToolError::InvalidArgs(format!(
                "Missing required fields for client creation: {}",
                missing.join(", ")
            )));
        }
        args::only_fields(&payload, CLIENT_FIELDS)?;
        check_client_enums(&data)?;
        check_client_uniqueness(store, &data, None)?;

        let client_id = next_numeric_id(store.table(CLIENTS)?);
        let now = store.now();
        let mut client = Record::new();
        client.insert("client_id".into(), json!(client_id));
        for field in CLIENT_FIELDS {
            if let Some(value) = data.get(*field).filter(|v| !v.is_null()) {
                client.insert(field.to_string(), value.clone());
            }
        }
        client.entry("status").or_insert_with(|| json!("active"));
        client.insert("created_at".into(), json!(now));
        client.insert("updated_at".into(), json!(now));
        store.insert(CLIENTS, &client_id, client.clone())?;
        info!(client_id = %client_id, "Client created");
        Ok(json!({
            "success": true,
            "action": "create",
            "client_id": client_id,
            "message": format!("Client {client_id} created successfully"),
            "client_data": client
        }))
    }

    fn update(&self, store: &mut Store, client_id: &str, data: Map<String, Value>) -> Result<Value, ToolError> {
        args::only_fields(&Value::Object(data.clone()), CLIENT_FIELDS)?;
        check_client_enums(&data)?;
        if data.get("client_name").is_some_and(|n| n.as_str().map_or(true, |n| n.trim().is_empty())) {
            return Err(ToolError::InvalidArgs("client_name cannot be empty".into()));
        }
        check_client_uniqueness(store, &data, Some(client_id))?;

        let now = store.now();
        let client = lookup::record_mut(store, CLIENTS, client_id, "Client")?;
        for (key, value) in data {
            client.insert(key, value);
        }
        client.insert("updated_at".into(), json!(now));
        info!(client_id = %client_id, "Client updated");
        Ok(json!({
            "success": true,
            "action": "update",
            "client_id": client_id,
            "message": format!("Client {client_id} updated successfully"),
            "client_data": client.clone()
        }))
    }
}

impl Tool for ManageClientsTool {
    fn name(&self) -> &str {
        "manage_clients"
    }

    fn description(&self) -> &str {
        "Create or update clients. Client names and registration numbers are unique."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "client_id": {"type": "string", "description": "Required for update."},
                "client_data": {
                    "type": "object",
                    "properties": {
                        "client_name": {"type": "string"},
                        "client_type": {"type": "string", "enum": CLIENT_TYPES},
                        "country": {"type": "string"},
                        "registration_number": {"type": "string"},
                        "contact_email": {"type": "string"},
                        "industry": {"type": "string"},
                        "status": {"type": "string", "enum": CLIENT_STATUSES}
                    }
                }
            },
            "required": ["action", "client_data"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[CLIENTS])?;
        let args: ManageClientArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &[])?;
        let data = args.client_data.filter(|d| !d.is_empty());
        match action {
            Action::Create => {
                let data = data
                    .ok_or_else(|| ToolError::InvalidArgs("client_data is required for create action".into()))?;
                self.create(store, data)
            }
            Action::Update => {
                let client_id = args
                    .client_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ToolError::InvalidArgs("client_id is required for update action".into()))?;
                if !store.contains(CLIENTS, &client_id)? {
                    return Err(ToolError::NotFound(format!("Client {client_id} not found")));
                }
                let data = data
                    .ok_or_else(|| ToolError::InvalidArgs("client_data is required for update action".into()))?;
                self.update(store, &client_id, data)
            }
        }
    }
}

/// Tier, status and date checks shared by create and update.
fn check_agreement_fields(data: &Record, current: Option<&Record>) -> Result<(), ToolError> {
    if let Some(tier) = data.get("tier") {
        one_of("tier", tier.as_str().unwrap_or_default(), SLA_TIERS)?;
    }
    if let Some(status) = data.get("status") {
        one_of("status", status.as_str().unwrap_or_default(), SLA_STATUSES)?;
    }
    let field = |name: &str| {
        data.str_field(name)
            .or_else(|| current.and_then(|c| c.str_field(name)))
    };
    let start = field("start_date").map(|d| validate::date("start_date", d)).transpose()?;
    let end = field("end_date").map(|d| validate::date("end_date", d)).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(ToolError::InvalidArgs("end_date cannot be before start_date".into()));
        }
    }
    Ok(())
}

/// One active agreement per client; the breach scan reads the tier from it.
fn ensure_single_active(store: &Store, client_id: &str, except: Option<&str>) -> Result<(), ToolError> {
    let existing = store.records(SLA_AGREEMENTS)?.find(|(id, sla)| {
        Some(id.as_str()) != except && sla.refers_to("client_id", client_id) && sla.is("status", "active")
    });
    match existing {
        Some((id, _)) => Err(ToolError::Conflict(format!(
            "Client {client_id} already has an active SLA agreement ({id})"
        ))),
        None => Ok(()),
    }
}

#[derive(Deserialize)]
struct ManageSlaArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    sla_id: Option<String>,
    sla_data: Option<Map<String, Value>>,
}

pub struct ManageSlaAgreementsTool;

impl ManageSlaAgreementsTool {
    fn create(&self, store: &mut Store, data: Map<String, Value>) -> Result<Value, ToolError> {
        let payload = Value::Object(data.clone());
        let missing = args::missing_fields(&payload, &["client_id", "tier"]);
        if !missing.is_empty() {
            return Err(ToolError::InvalidArgs(format!(
                "Missing required fields for SLA agreement creation: {}",
                missing.join(", ")
            )));
        }
        args::only_fields(&payload, SLA_CREATE_FIELDS)?;
        check_agreement_fields(&data, None)?;
        let client_id = data.id_field("client_id").unwrap_or_default();
        lookup::ensure(store, CLIENTS, &client_id, "Client")?;
        let status = data.str_or("status", "active").to_string();
        if status == "active" {
            ensure_single_active(store, &client_id, None)?;
        }

        let sla_id = next_numeric_id(store.table(SLA_AGREEMENTS)?);
        let now = store.now();
        let sla = json!({
            "sla_id": sla_id,
            "client_id": client_id,
            "tier": data.get("tier"),
            "status": status,
            "start_date": data.get("start_date"),
            "end_date": data.get("end_date"),
            "created_at": now,
            "updated_at": now
        });
        store.insert(SLA_AGREEMENTS, &sla_id, sla.as_object().cloned().unwrap_or_default())?;
        info!(sla_id = %sla_id, client_id = %client_id, "SLA agreement created");
        Ok(json!({"success": true, "action": "create", "sla_id": sla_id, "sla_data": sla}))
    }

    fn update(&self, store: &mut Store, sla_id: &str, data: Map<String, Value>) -> Result<Value, ToolError> {
        let payload = Value::Object(data.clone());
        if payload.get("client_id").is_some() {
            return Err(ToolError::InvalidArgs(
                "Invalid fields for SLA agreement update: client_id. Cannot move an agreement to another client."
                    .into(),
            ));
        }
        args::only_fields(&payload, SLA_UPDATE_FIELDS)?;
        let current = lookup::record(store, SLA_AGREEMENTS, sla_id, "SLA agreement")?;
        check_agreement_fields(&data, Some(current))?;
        if data.str_field("status") == Some("active") && !current.is("status", "active") {
            let client_id = current.id_field("client_id").unwrap_or_default();
            ensure_single_active(store, &client_id, Some(sla_id))?;
        }

        let now = store.now();
        let sla = lookup::record_mut(store, SLA_AGREEMENTS, sla_id, "SLA agreement")?;
        for (key, value) in data {
            sla.insert(key, value);
        }
        sla.insert("updated_at".into(), json!(now));
        info!(sla_id = %sla_id, "SLA agreement updated");
        Ok(json!({"success": true, "action": "update", "sla_id": sla_id, "sla_data": sla.clone()}))
    }
}

impl Tool for ManageSlaAgreementsTool {
    fn name(&self) -> &str {
        "manage_sla_agreements"
    }

    fn description(&self) -> &str {
        "Create or update client SLA agreements. The tier of a client's active agreement \
         sets the resolution targets used by get_sla_breach_incidents."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "sla_id": {"type": "string", "description": "Required for update."},
                "sla_data": {
                    "type": "object",
                    "properties": {
                        "client_id": {"type": "string", "description": "Create only."},
                        "tier": {"type": "string", "enum": SLA_TIERS},
                        "status": {"type": "string", "enum": SLA_STATUSES},
                        "start_date": {"type": "string", "description": "YYYY-MM-DD"},
                        "end_date": {"type": "string", "description": "YYYY-MM-DD"}
                    }
                }
            },
            "required": ["action", "sla_data"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[SLA_AGREEMENTS, CLIENTS])?;
        let args: ManageSlaArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &[])?;
        let data = args.sla_data.filter(|d| !d.is_empty());
        match action {
            Action::Create => {
                let data =
                    data.ok_or_else(|| ToolError::InvalidArgs("sla_data is required for create action".into()))?;
                self.create(store, data)
            }
            Action::Update => {
                let sla_id = args
                    .sla_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ToolError::InvalidArgs("sla_id is required for update action".into()))?;
                if !store.contains(SLA_AGREEMENTS, &sla_id)? {
                    return Err(ToolError::NotFound(format!("SLA agreement record {sla_id} not found")));
                }
                let data =
                    data.ok_or_else(|| ToolError::InvalidArgs("sla_data is required for update action".into()))?;
                self.update(store, &sla_id, data)
            }
        }
    }
}
