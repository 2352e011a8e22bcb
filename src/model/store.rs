use indexmap::IndexMap;

use crate::value::Value;

/// Per-instance attribute storage.
///
/// Declared properties live in the typed slots. Keys accepted by a permissive
/// class without a declaration go to a separate schemaless map so they never
/// mix with the schema.
#[derive(Debug, Clone, Default)]
pub struct AttributeStore {
    typed: IndexMap<String, Value>,
    schemaless: IndexMap<String, Value>,
}

impl AttributeStore {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.typed.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.typed.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.typed.insert(name.into(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.typed.shift_remove(name)
    }

    pub fn schemaless(&self, key: &str) -> Option<&Value> {
        self.schemaless.get(key)
    }

    pub fn insert_schemaless(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.schemaless.insert(key.into(), value)
    }

    pub fn typed_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.typed.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn schemaless_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schemaless.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.typed.is_empty() && self.schemaless.is_empty()
    }

    pub fn clear(&mut self) {
        self.typed.clear();
        self.schemaless.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_and_schemaless_are_separate() {
        let mut store = AttributeStore::default();
        store.insert("name", Value::from("Sam"));
        store.insert_schemaless("name", Value::from("shadow"));
        assert_eq!(store.get("name"), Some(&Value::from("Sam")));
        assert_eq!(store.schemaless("name"), Some(&Value::from("shadow")));
        assert_eq!(store.remove("name"), Some(Value::from("Sam")));
        assert!(!store.contains("name"));
        assert!(!store.is_empty());
        store.clear();
        assert!(store.is_empty());
    }
}
