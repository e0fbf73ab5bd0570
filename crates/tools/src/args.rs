//! Argument decoding shared by every tool.

use crate::ToolError;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;

/// Decode tool arguments, mapping serde failures to `InvalidArgs`.
pub fn parse<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { Value::Object(Default::default()) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArgs(format!("Invalid arguments: {e}")))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
}

/// Optional identifier given either as a string or an integer.
pub fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    }))
}

/// Optional list of identifiers, each a string or an integer.
pub fn opt_ids<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<RawId>>::deserialize(deserializer)?.map(|ids| {
        ids.into_iter()
            .map(|raw| match raw {
                RawId::Text(s) => s,
                RawId::Int(n) => n.to_string(),
            })
            .collect()
    }))
}

/// Unwrap a required argument, reporting `<field> is required` when absent.
pub fn required<T>(field: &str, value: Option<T>) -> Result<T, ToolError> {
    value.ok_or_else(|| ToolError::InvalidArgs(format!("{field} is required")))
}

/// Like [`required`] for strings, also rejecting blank values.
pub fn required_str(field: &str, value: Option<String>) -> Result<String, ToolError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ToolError::InvalidArgs(format!("{field} is required"))),
    }
}

/// Names of required fields that are missing or blank, in the given order.
pub fn missing_fields(args: &Value, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter(|field| match args.get(**field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            _ => false,
        })
        .map(|field| field.to_string())
        .collect()
}

/// Reject keys outside `allowed`, listing them sorted.
pub fn only_fields(args: &Value, allowed: &[&str]) -> Result<(), ToolError> {
    let Some(map) = args.as_object() else {
        return Ok(());
    };
    let mut unknown: Vec<&str> = map
        .keys()
        .map(String::as_str)
        .filter(|k| !allowed.contains(k))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    unknown.sort_unstable();
    Err(ToolError::InvalidArgs(format!(
        "Invalid fields: {}",
        unknown.join(", ")
    )))
}

/// `action` argument of the `manage_*` tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
}

impl Action {
    /// Parse `create`/`update`; `aliases` name extra spellings of `create`.
    pub fn parse(raw: Option<&str>, aliases: &[&str]) -> Result<Self, ToolError> {
        match raw.map(str::trim) {
            Some("create") => Ok(Action::Create),
            Some("update") => Ok(Action::Update),
            Some(other) if aliases.contains(&other) => Ok(Action::Create),
            other => Err(ToolError::InvalidArgs(format!(
                "Invalid action '{}'. Must be 'create' or 'update'",
                other.unwrap_or_default()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "opt_id")]
        employee_id: Option<String>,
        #[serde(default, deserialize_with = "opt_ids")]
        contributors: Option<Vec<String>>,
    }

    #[test]
    fn ids_accept_strings_and_integers() {
        let s: Sample = parse(json!({"employee_id": 12, "contributors": ["3", 4]})).expect("args");
        assert_eq!(s.employee_id.as_deref(), Some("12"));
        assert_eq!(s.contributors, Some(vec!["3".to_string(), "4".to_string()]));

        let s: Sample = parse(Value::Null).expect("args");
        assert!(s.employee_id.is_none());
    }

    #[test]
    fn missing_fields_treats_blank_as_missing() {
        let args = json!({"title": " ", "url": "x", "target_id": null});
        assert_eq!(
            missing_fields(&args, &["title", "url", "target_id", "created_by"]),
            vec!["title", "target_id", "created_by"]
        );
    }

    #[test]
    fn only_fields_lists_unknown_keys() {
        let err = only_fields(&json!({"b": 1, "a": 2, "ok": 3}), &["ok"]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid fields: a, b");
    }

    #[test]
    fn actions_accept_aliases_for_create() {
        assert_eq!(Action::parse(Some("update"), &[]).expect("action"), Action::Update);
        assert_eq!(Action::parse(Some("conduct"), &["conduct"]).expect("action"), Action::Create);
        let err = Action::parse(Some("delete"), &[]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid action 'delete'. Must be 'create' or 'update'");
    }
}
