//! Saving and loading root documents through a [`DocumentStore`].
//!
//! Only document classes are persistable. Embedded objects travel inside
//! their root's plain form and are marked persisted together with it.
use indexmap::IndexMap;
use std::sync::Arc;

use crate::class::ModelClass;
use crate::error::{CastError, Result, StoreError};
use crate::model::Model;
use crate::value::Value;

/// Identity assigned by the store on a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    pub id: String,
    pub rev: String,
}

/// External document database. `put` receives the plain form, including
/// `_id` / `_rev` when the document already has them.
pub trait DocumentStore {
    fn put(&mut self, doc: serde_json::Value) -> std::result::Result<Revision, StoreError>;
    fn get(&self, id: &str) -> Option<serde_json::Value>;
}

/// In-process store with optimistic revision checks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: IndexMap<String, serde_json::Value>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

fn generation(rev: &str) -> u64 {
    rev.split_once('-').and_then(|(n, _)| n.parse().ok()).unwrap_or(0)
}

impl DocumentStore for MemoryStore {
    fn put(&mut self, doc: serde_json::Value) -> std::result::Result<Revision, StoreError> {
        let mut body = match doc {
            serde_json::Value::Object(body) => body,
            other => return Err(StoreError::NotAnObject { found: Value::from_json(&other).kind_name() }),
        };
        let id = match body.get("_id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => {
                self.next_id += 1;
                format!("{:032x}", self.next_id)
            }
        };
        let given = body.get("_rev").and_then(|v| v.as_str()).map(str::to_string);
        let current = self.docs.get(&id).and_then(|d| d.get("_rev")).and_then(|v| v.as_str());
        if current != given.as_deref() {
            return Err(StoreError::Conflict { id });
        }
        let next = current.map(generation).unwrap_or(0) + 1;
        let rev = format!("{next}-{:08x}", self.next_id.wrapping_mul(31).wrapping_add(next));
        body.insert("_id".to_string(), serde_json::Value::String(id.clone()));
        body.insert("_rev".to_string(), serde_json::Value::String(rev.clone()));
        self.docs.insert(id.clone(), serde_json::Value::Object(body));
        Ok(Revision { id, rev })
    }

    fn get(&self, id: &str) -> Option<serde_json::Value> {
        self.docs.get(id).cloned()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MODEL
// ————————————————————————————————————————————————————————————————————————————

impl Model {
    /// Validate and write. Returns `Ok(false)` without touching the object
    /// when it is not a root document or fails validation. A persisted
    /// document whose plain form is unchanged is not written again.
    pub fn save<S: DocumentStore + ?Sized>(&self, store: &mut S) -> Result<bool> {
        if !self.is_base_doc() {
            tracing::warn!(class = %self.class_name(), "refusing to save an embedded object");
            return Ok(false);
        }
        if !self.valid() {
            tracing::warn!(class = %self.class_name(), errors = %self.errors(), "refusing to save an invalid document");
            return Ok(false);
        }
        if !self.is_new() && !self.changed() {
            tracing::debug!(class = %self.class_name(), id = ?self.id(), "unchanged; skipping write");
            return Ok(true);
        }
        let saved = store.put(self.to_plain())?;
        tracing::debug!(class = %self.class_name(), id = %saved.id, rev = %saved.rev, "saved document");
        self.set_identity(Some(saved.id), Some(saved.rev));
        self.mark_persisted();
        self.remember_saved_form();
        Ok(true)
    }

    /// Like [`Model::save`] but refusal is an error.
    pub fn save_strict<S: DocumentStore + ?Sized>(&self, store: &mut S) -> Result<()> {
        if !self.is_base_doc() {
            return Err(CastError::NotADocument { class: self.class_name() });
        }
        if self.save(store)? {
            Ok(())
        } else {
            Err(CastError::Invalid { class: self.class_name(), errors: self.errors().to_string() })
        }
    }

    /// Explicit update followed by a save.
    pub fn update_attributes<S: DocumentStore + ?Sized>(
        &self,
        attrs: IndexMap<String, Value>,
        store: &mut S,
    ) -> Result<bool> {
        self.update_attributes_without_saving(attrs)?;
        self.save(store)
    }
}

impl ModelClass {
    /// Load a stored document, or `None` when the id is unknown.
    pub fn get<S: DocumentStore + ?Sized>(self: &Arc<Self>, store: &S, id: &str) -> Result<Option<Model>> {
        if !self.is_document() {
            return Err(CastError::NotADocument { class: self.name().to_string() });
        }
        store.get(id).map(|doc| self.load(&doc)).transpose()
    }

    /// Like [`ModelClass::get`] but a missing document is an error.
    pub fn find<S: DocumentStore + ?Sized>(self: &Arc<Self>, store: &S, id: &str) -> Result<Model> {
        self.get(store, id)?.ok_or_else(|| StoreError::NotFound { id: id.to_string() }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ModelClassBuilder;
    use crate::property::PropertyBuilder;
    use crate::schema::{Schema, SchemaBuilder};
    use crate::value::attrs;
    use serde_json::json;

    fn schema() -> Schema {
        SchemaBuilder::new()
            .class(
                ModelClassBuilder::document("Invoice")
                    .property(PropertyBuilder::new("client_name"))
                    .unwrap()
                    .property(PropertyBuilder::new("lines").array_of_models("Line"))
                    .unwrap()
                    .validates_presence_of("client_name"),
            )
            .unwrap()
            .class(ModelClassBuilder::embeddable("Line").property(PropertyBuilder::new("amount")).unwrap())
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn save_assigns_identity_and_marks_graph_persisted() {
        let schema = schema();
        let mut store = MemoryStore::new();
        let invoice = schema.class("Invoice").unwrap().instantiate().unwrap();
        invoice
            .assign_attributes(attrs(json!({"client_name": "Ann", "lines": [{"amount": 3}]})))
            .unwrap();
        let line = invoice.get("lines").unwrap().as_collection().unwrap().first().unwrap();
        assert!(invoice.is_new());
        assert!(invoice.save(&mut store).unwrap());
        assert!(!invoice.is_new());
        assert!(!line.as_model().unwrap().is_new());
        assert!(invoice.id().is_some());
        assert!(invoice.rev().unwrap().starts_with("1-"));

        let loaded = schema.class("Invoice").unwrap().find(&store, &invoice.id().unwrap()).unwrap();
        assert!(!loaded.is_new());
        assert_eq!(loaded.to_plain(), invoice.to_plain());
    }

    #[test]
    fn invalid_documents_are_not_saved() {
        let schema = schema();
        let mut store = MemoryStore::new();
        let invoice = schema.class("Invoice").unwrap().instantiate().unwrap();
        assert!(!invoice.save(&mut store).unwrap());
        assert!(store.is_empty());
        assert!(invoice.is_new());
        assert!(matches!(invoice.save_strict(&mut store), Err(CastError::Invalid { .. })));
    }

    #[test]
    fn embedded_objects_are_not_persistable() {
        let schema = schema();
        let mut store = MemoryStore::new();
        let line = schema.class("Line").unwrap().instantiate().unwrap();
        assert!(!line.save(&mut store).unwrap());
        assert!(matches!(line.save_strict(&mut store), Err(CastError::NotADocument { .. })));
    }

    #[test]
    fn stale_revisions_conflict() {
        let schema = schema();
        let mut store = MemoryStore::new();
        let invoice = schema.class("Invoice").unwrap().instantiate().unwrap();
        invoice.set("client_name", "Ann").unwrap();
        invoice.save(&mut store).unwrap();
        let copy = schema.class("Invoice").unwrap().find(&store, &invoice.id().unwrap()).unwrap();
        assert!(invoice.update_attributes(attrs(json!({"client_name": "Bob"})), &mut store).unwrap());
        copy.set("client_name", "Eve").unwrap();
        assert!(matches!(copy.save(&mut store), Err(CastError::Store(StoreError::Conflict { .. }))));
    }

    #[test]
    fn unchanged_documents_keep_their_revision() {
        let schema = schema();
        let mut store = MemoryStore::new();
        let invoice = schema.class("Invoice").unwrap().instantiate().unwrap();
        invoice.set("client_name", "Ann").unwrap();
        invoice.save(&mut store).unwrap();
        let rev = invoice.rev();
        assert!(!invoice.changed());
        invoice.assign_attributes(attrs(json!({"bogus": 1}))).unwrap();
        assert!(invoice.save(&mut store).unwrap());
        assert_eq!(invoice.rev(), rev);
        invoice.set("client_name", "Bob").unwrap();
        assert!(invoice.changed());
        invoice.save(&mut store).unwrap();
        assert_ne!(invoice.rev(), rev);
    }

    #[test]
    fn missing_documents() {
        let schema = schema();
        let store = MemoryStore::new();
        let class = schema.class("Invoice").unwrap();
        assert!(class.get(&store, "nope").unwrap().is_none());
        assert!(matches!(class.find(&store, "nope"), Err(CastError::Store(StoreError::NotFound { .. }))));
    }
}
