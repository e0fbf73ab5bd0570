use crate::clock::Clock;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

/// One row of a table.
pub type Record = Map<String, Value>;

/// A table: string ID to record.
pub type Table = Map<String, Value>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("Invalid data format: 'data' must be a dict")]
    NotAnObject,
    #[error("Invalid {0} container: expected dict at data['{0}']")]
    InvalidContainer(String),
}

fn empty_table() -> &'static Table {
    static EMPTY: OnceLock<Table> = OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

/// In-memory store of named tables shared by every tool invocation.
#[derive(Debug, Clone, Default)]
pub struct Store {
    data: Map<String, Value>,
    clock: Clock,
}

impl Store {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            clock: Clock::default(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(data) => Ok(Self::new(data)),
            _ => Err(StoreError::NotAnObject),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Current timestamp in record format.
    pub fn now(&self) -> String {
        self.clock.timestamp()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.data.keys().map(String::as_str)
    }

    /// Read a table. A missing table reads as empty.
    pub fn table(&self, name: &str) -> Result<&Table, StoreError> {
        match self.data.get(name) {
            None => Ok(empty_table()),
            Some(Value::Object(table)) => Ok(table),
            Some(_) => Err(StoreError::InvalidContainer(name.to_string())),
        }
    }

    /// Mutable access to a table, created empty on first use.
    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table, StoreError> {
        let entry = self
            .data
            .entry(name.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        entry
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidContainer(name.to_string()))
    }

    /// Validate that every named table is either absent or a mapping.
    pub fn check_tables(&self, names: &[&str]) -> Result<(), StoreError> {
        for name in names {
            self.table(name)?;
        }
        Ok(())
    }

    pub fn contains(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        Ok(self.get(table, id)?.is_some())
    }

    pub fn get(&self, table: &str, id: &str) -> Result<Option<&Record>, StoreError> {
        Ok(self.table(table)?.get(id).and_then(Value::as_object))
    }

    pub fn get_mut(&mut self, table: &str, id: &str) -> Result<Option<&mut Record>, StoreError> {
        Ok(self.table_mut(table)?.get_mut(id).and_then(Value::as_object_mut))
    }

    pub fn insert(&mut self, table: &str, id: &str, record: Record) -> Result<(), StoreError> {
        self.table_mut(table)?
            .insert(id.to_string(), Value::Object(record));
        Ok(())
    }

    pub fn remove(&mut self, table: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.table_mut(table)?.remove(id))
    }

    /// Iterate the rows of a table that are mappings, in insertion order.
    pub fn records(&self, table: &str) -> Result<impl Iterator<Item = (&String, &Record)> + '_, StoreError> {
        Ok(self
            .table(table)?
            .iter()
            .filter_map(|(id, row)| row.as_object().map(|record| (id, record))))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Store {
        Store::from_value(json!({
            "employees": {
                "1": {"employee_id": "1", "full_name": "Ada"},
                "2": "not a record"
            },
            "broken": []
        }))
        .expect("object store")
    }

    #[test]
    fn rejects_non_object_root() {
        assert_eq!(
            Store::from_value(json!([1, 2])).unwrap_err(),
            StoreError::NotAnObject
        );
    }

    #[test]
    fn missing_table_reads_as_empty() {
        let store = sample();
        assert!(store.table("payments").expect("table").is_empty());
    }

    #[test]
    fn non_object_table_is_an_error() {
        let store = sample();
        let err = store.table("broken").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid broken container: expected dict at data['broken']"
        );
        assert!(store.check_tables(&["employees", "broken"]).is_err());
    }

    #[test]
    fn records_skip_non_object_rows() {
        let store = sample();
        let ids: Vec<_> = store
            .records("employees")
            .expect("records")
            .map(|(id, _)| id.clone())
            .collect();
        assert_eq!(ids, vec!["1".to_string()]);
    }

    #[test]
    fn insert_creates_table() {
        let mut store = Store::default();
        let mut record = Record::new();
        record.insert("amount".into(), json!(10));
        store.insert("payments", "1", record).expect("insert");
        assert!(store.contains("payments", "1").expect("lookup"));
        assert_eq!(store.now(), "2025-11-16T23:59:00");
    }
}
