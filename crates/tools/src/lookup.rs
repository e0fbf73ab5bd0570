//! Foreign-key resolution and generic filtering over store tables.

use crate::ToolError;
use opsdesk_core::record::value_id;
use opsdesk_core::{Record, Store};
use serde_json::{Map, Value};

/// Resolve `table[id]`, failing with `<label> with ID '<id>' not found`.
pub fn record<'a>(store: &'a Store, table: &str, id: &str, label: &str) -> Result<&'a Record, ToolError> {
    store
        .get(table, id)?
        .ok_or_else(|| ToolError::NotFound(format!("{label} with ID '{id}' not found")))
}

pub fn record_mut<'a>(
    store: &'a mut Store,
    table: &str,
    id: &str,
    label: &str,
) -> Result<&'a mut Record, ToolError> {
    store
        .get_mut(table, id)?
        .ok_or_else(|| ToolError::NotFound(format!("{label} with ID '{id}' not found")))
}

/// Fail unless `table[id]` exists.
pub fn ensure(store: &Store, table: &str, id: &str, label: &str) -> Result<(), ToolError> {
    record(store, table, id, label).map(|_| ())
}

/// Loose equality used by filters: identifiers compare as strings, numbers as numbers.
pub fn values_match(stored: Option<&Value>, wanted: &Value) -> bool {
    match (stored, wanted) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(stored), wanted) if stored == wanted => true,
        (Some(stored), wanted) => match (value_id(stored), value_id(wanted)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// Rows of `table` whose fields equal every entry of `filters`.
///
/// `id_field` also matches against the row key. Each result carries `id_field`.
pub fn filter_records(
    store: &Store,
    table: &str,
    id_field: &str,
    filters: &Map<String, Value>,
) -> Result<Vec<Value>, ToolError> {
    let mut results = Vec::new();
    for (key, row) in store.records(table)? {
        let matched = filters.iter().all(|(field, wanted)| {
            if field == id_field {
                let wanted = value_id(wanted);
                wanted.as_deref() == Some(key.as_str())
                    || row.get(id_field).and_then(value_id) == wanted
            } else {
                values_match(row.get(field), wanted)
            }
        });
        if matched {
            let mut out = row.clone();
            out.entry(id_field.to_string())
                .or_insert_with(|| Value::String(key.clone()));
            results.push(Value::Object(out));
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        Store::from_value(json!({
            "payroll_inputs": {
                "1": {"employee_id": "4", "hours_worked": 40},
                "2": {"input_id": "2", "employee_id": 5, "hours_worked": 38.0}
            }
        }))
        .expect("store")
    }

    #[test]
    fn missing_record_names_the_entity() {
        let store = store();
        let err = record(&store, "payroll_inputs", "9", "Payroll input").unwrap_err();
        assert_eq!(err.to_string(), "Payroll input with ID '9' not found");
    }

    #[test]
    fn filters_compare_ids_loosely() {
        let store = store();
        let filters = json!({"employee_id": "5"}).as_object().cloned().expect("map");
        let rows = filter_records(&store, "payroll_inputs", "input_id", &filters).expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["input_id"], "2");
    }

    #[test]
    fn id_filter_matches_row_key() {
        let store = store();
        let filters = json!({"input_id": 1}).as_object().cloned().expect("map");
        let rows = filter_records(&store, "payroll_inputs", "input_id", &filters).expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["input_id"], "1");
    }

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_match(Some(&json!(38.0)), &json!(38)));
        assert!(!values_match(None, &json!("x")));
    }
}
