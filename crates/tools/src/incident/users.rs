use super::{CLIENTS, USERS, VENDORS};
use crate::args::{self, opt_id, Action};
use crate::validate::one_of;
use crate::{lookup, Tool, ToolError};
use opsdesk_core::ids::next_numeric_id;
use opsdesk_core::{Record, RecordExt, Store};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

const ROLES: &[&str] = &[
    "incident_manager",
    "technical_support",
    "account_manager",
    "executive",
    "vendor_contact",
    "system_administrator",
    "client_contact",
];
const STATUSES: &[&str] = &["active", "inactive", "suspended"];
const FIELDS: &[&str] = &[
    "first_name",
    "last_name",
    "email",
    "role",
    "timezone",
    "status",
    "client_id",
    "vendor_id",
];

/// Contact roles must point at an existing client or vendor.
fn check_affiliation(store: &Store, role: &str, data: &Record, required: bool) -> Result<(), ToolError> {
    let (field, table, label) = match role {
        "client_contact" => ("client_id", CLIENTS, "Client"),
        "vendor_contact" => ("vendor_id", VENDORS, "Vendor"),
        _ => return Ok(()),
    };
    match data.id_field(field) {
        Some(id) if !store.contains(table, &id)? => Err(ToolError::NotFound(format!("{label} not found"))),
        Some(_) => Ok(()),
        None if required => Err(ToolError::InvalidArgs(format!("{field} is required for {role} role"))),
        None => Ok(()),
    }
}

fn email_taken(store: &Store, email: &str, except: Option<&str>) -> Result<bool, ToolError> {
    Ok(store
        .records(USERS)?
        .any(|(id, u)| Some(id.as_str()) != except && u.is("email", email)))
}

#[derive(Deserialize)]
struct ManageUserArgs {
    action: Option<String>,
    #[serde(default, deserialize_with = "opt_id")]
    user_id: Option<String>,
    user_data: Option<Map<String, Value>>,
}

pub struct ManageUsersTool;

impl ManageUsersTool {
    fn create(&self, store: &mut Store, data: Map<String, Value>) -> Result<Value, ToolError> {
        let missing: Vec<&str> = ["first_name", "last_name", "email", "role", "timezone"]
            .into_iter()
            .filter(|f| !data.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidArgs(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }
        args::only_fields(&Value::Object(data.clone()), FIELDS)?;
        let role = data.str_or("role", "");
        one_of("role", role, ROLES)?;
        if let Some(status) = data.get("status") {
            one_of("status", status.as_str().unwrap_or_default(), STATUSES)?;
        }
        let email = data.str_or("email", "");
        if email_taken(store, email, None)? {
            return Err(ToolError::Conflict("Email already exists".into()));
        }
        check_affiliation(store, role, &data, true)?;

        let user_id = next_numeric_id(store.table(USERS)?);
        let now = store.now();
        let user = json!({
            "user_id": user_id,
            "first_name": data.get("first_name"),
            "last_name": data.get("last_name"),
            "email": email,
            "role": role,
            "timezone": data.get("timezone"),
            "status": data.str_or("status", "active"),
            "client_id": data.id_field("client_id"),
            "vendor_id": data.id_field("vendor_id"),
            "created_at": now,
            "updated_at": now
        });
        store.insert(USERS, &user_id, user.as_object().cloned().unwrap_or_default())?;
        info!(user_id = %user_id, role, "User created");
        Ok(json!({"success": true, "action": "create", "user_id": user_id, "user_data": user}))
    }

    fn update(&self, store: &mut Store, user_id: &str, data: Map<String, Value>) -> Result<Value, ToolError> {
        args::only_fields(&Value::Object(data.clone()), FIELDS)?;
        if let Some(role) = data.get("role") {
            one_of("role", role.as_str().unwrap_or_default(), ROLES)?;
        }
        if let Some(status) = data.get("status") {
            one_of("status", status.as_str().unwrap_or_default(), STATUSES)?;
        }
        if let Some(email) = data.str_field("email") {
            if email_taken(store, email, Some(user_id))? {
                return Err(ToolError::Conflict("New email already exists".into()));
            }
        }
        let current = lookup::record(store, USERS, user_id, "User")?;
        let role = data
            .str_field("role")
            .or_else(|| current.str_field("role"))
            .unwrap_or_default()
            .to_string();
        check_affiliation(store, &role, &data, false)?;

        let now = store.now();
        let user = lookup::record_mut(store, USERS, user_id, "User")?;
        for (key, value) in data {
            user.insert(key, value);
        }
        user.insert("updated_at".into(), json!(now));
        info!(user_id = %user_id, "User updated");
        Ok(json!({"success": true, "action": "update", "user_id": user_id, "user_data": user.clone()}))
    }
}

impl Tool for ManageUsersTool {
    fn name(&self) -> &str {
        "manage_users"
    }

    fn description(&self) -> &str {
        "Create or update users. Emails are unique; client and vendor contacts must reference \
         an existing client or vendor."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["create", "update"]},
                "user_id": {"type": "string", "description": "Required for update."},
                "user_data": {
                    "type": "object",
                    "properties": {
                        "first_name": {"type": "string"},
                        "last_name": {"type": "string"},
                        "email": {"type": "string"},
                        "role": {"type": "string", "enum": ROLES},
                        "timezone": {"type": "string"},
                        "status": {"type": "string", "enum": STATUSES},
                        "client_id": {"type": "string"},
                        "vendor_id": {"type": "string"}
                    }
                }
            },
            "required": ["action", "user_data"]
        })
    }

    fn invoke(&self, store: &mut Store, args: Value) -> Result<Value, ToolError> {
        store.check_tables(&[USERS, CLIENTS, VENDORS])?;
        let args: ManageUserArgs = args::parse(args)?;
        let action = Action::parse(args.action.as_deref(), &[])?;
        let data = args.user_data.filter(|d| !d.is_empty());
        match action {
            Action::Create => {
                let data =
                    data.ok_or_else(|| ToolError::InvalidArgs("user_data is required for create action".into()))?;
                self.create(store, data)
            }
            Action::Update => {
                let user_id = args
                    .user_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| ToolError::InvalidArgs("user_id is required for update action".into()))?;
                if !store.contains(USERS, &user_id)? {
                    return Err(ToolError::NotFound(format!("User {user_id} not found")));
                }
                let data =
                    data.ok_or_else(|| ToolError::InvalidArgs("user_data is required for update action".into()))?;
                self.update(store, &user_id, data)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::fixtures;

    #[test]
    fn client_contact_needs_existing_client() {
        let mut store = fixtures::store();
        let base = json!({"first_name": "Dee", "last_name": "Lo", "email": "dee@client.test",
                          "role": "client_contact", "timezone": "UTC"});
        let err = ManageUsersTool
            .invoke(&mut store, json!({"action": "create", "user_data": base}))
            .unwrap_err();
        assert_eq!(err.to_string(), "client_id is required for client_contact role");

        let mut data = base.clone();
        data["client_id"] = json!(1);
        let out = ManageUsersTool
            .invoke(&mut store, json!({"action": "create", "user_data": data}))
            .expect("user");
        assert_eq!(out["user_id"], "4");
        assert_eq!(out["user_data"]["client_id"], "1");
        assert_eq!(out["user_data"]["status"], "active");
    }

    #[test]
    fn emails_stay_unique() {
        let mut store = fixtures::store();
        let err = ManageUsersTool
            .invoke(
                &mut store,
                json!({"action": "create", "user_data": {"first_name": "A", "last_name": "B",
                       "email": "ada@ops.test", "role": "executive", "timezone": "UTC"}}),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Email already exists");

        let err = ManageUsersTool
            .invoke(&mut store, json!({"action": "update", "user_id": "3", "user_data": {"email": "bo@ops.test"}}))
            .unwrap_err();
        assert_eq!(err.to_string(), "New email already exists");
    }

    #[test]
    fn update_rejects_unknown_fields_and_applies_changes() {
        let mut store = fixtures::store();
        let err = ManageUsersTool
            .invoke(&mut store, json!({"action": "update", "user_id": "2", "user_data": {"nickname": "b"}}))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid fields: nickname");

        let out = ManageUsersTool
            .invoke(&mut store, json!({"action": "update", "user_id": "2", "user_data": {"status": "active"}}))
            .expect("updated");
        assert_eq!(out["user_data"]["status"], "active");
    }
}
