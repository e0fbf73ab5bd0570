use crate::store::Record;
use serde_json::Value;

/// Typed reads over a loosely shaped record.
pub trait RecordExt {
    fn str_field(&self, key: &str) -> Option<&str>;
    fn f64_field(&self, key: &str) -> Option<f64>;
    fn bool_field(&self, key: &str) -> Option<bool>;
    /// String or integer identifier, normalised to a string.
    fn id_field(&self, key: &str) -> Option<String>;

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.str_field(key).unwrap_or(default)
    }

    fn f64_or_zero(&self, key: &str) -> f64 {
        self.f64_field(key).unwrap_or(0.0)
    }

    /// `true` when the field holds the given string.
    fn is(&self, key: &str, expected: &str) -> bool {
        self.str_field(key) == Some(expected)
    }

    /// `true` when the identifier field equals `id`.
    fn refers_to(&self, key: &str, id: &str) -> bool {
        self.id_field(key).as_deref() == Some(id)
    }
}

impl RecordExt for Record {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn f64_field(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn bool_field(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn id_field(&self, key: &str) -> Option<String> {
        value_id(self.get(key)?)
    }
}

/// Identifier carried by a JSON value, if it is a string or an integer.
pub fn value_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

/// Round to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// JSON number for a money amount, rounded to cents.
pub fn money(value: f64) -> Value {
    serde_json::Number::from_f64(round2(value))
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_mixed_id_types() {
        let record = json!({"a": "7", "b": 7, "c": 7.5})
            .as_object()
            .cloned()
            .expect("object");
        assert_eq!(record.id_field("a").as_deref(), Some("7"));
        assert_eq!(record.id_field("b").as_deref(), Some("7"));
        assert_eq!(record.id_field("c"), None);
        assert!(record.refers_to("b", "7"));
    }

    #[test]
    fn numeric_strings_read_as_numbers() {
        let record = json!({"amount": "12.5", "other": true})
            .as_object()
            .cloned()
            .expect("object");
        assert_eq!(record.f64_field("amount"), Some(12.5));
        assert_eq!(record.f64_or_zero("other"), 0.0);
    }

    #[test]
    fn rounds_to_cents() {
        assert_eq!(round2(10.005_1), 10.01);
        assert_eq!(money(1.234), json!(1.23));
    }
}
