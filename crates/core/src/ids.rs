//! Deterministic identifier schemes.

use crate::store::Table;
use serde_json::Value;

/// Next integer key: the largest numeric key plus one, `"1"` for an empty table.
/// Keys that are not integers do not take part.
pub fn next_numeric_id(table: &Table) -> String {
    let max = table
        .keys()
        .filter_map(|key| key.trim().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

/// `prefix` followed by `n` zero padded to `width` digits, e.g. `APR00000012`.
pub fn prefixed(prefix: &str, n: u64, width: usize) -> String {
    format!("{prefix}{n:0width$}")
}

/// Next human-facing number for a field such as `incident_number`.
///
/// Scans `field` on every row for values of the form `<prefix><digits>` and returns
/// the successor of the highest one.
pub fn next_sequence_number(table: &Table, field: &str, prefix: &str, width: usize) -> String {
    let max = table
        .values()
        .filter_map(|row| row.get(field).and_then(Value::as_str))
        .filter_map(|value| value.strip_prefix(prefix))
        .filter_map(|digits| digits.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    prefixed(prefix, max + 1, width)
}

/// Identifier of the `position`-th task (1-based) in a checklist.
pub fn task_id(position: usize) -> String {
    format!("task_{position}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(value: Value) -> Table {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn numeric_ids_start_at_one() {
        assert_eq!(next_numeric_id(&Table::new()), "1");
    }

    #[test]
    fn numeric_ids_skip_non_numeric_keys() {
        let t = table(json!({"3": {}, "10": {}, "abc": {}}));
        assert_eq!(next_numeric_id(&t), "11");
    }

    #[test]
    fn sequence_numbers_follow_highest_value() {
        let t = table(json!({
            "1": {"incident_number": "INC0000007"},
            "2": {"incident_number": "INC0000002"},
            "3": {"incident_number": "legacy"}
        }));
        assert_eq!(
            next_sequence_number(&t, "incident_number", "INC", 7),
            "INC0000008"
        );
        assert_eq!(prefixed("PIR", 4, 8), "PIR00000004");
        assert_eq!(task_id(3), "task_3");
    }
}
