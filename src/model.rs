//! Casted objects.
//!
//! A [`Model`] is a shared handle to one instance of a [`ModelClass`]: its
//! attribute store, its identity (for documents) and the non-owning
//! back-reference to the object that casted it. Parents own children through
//! their attribute slots; children only ever point back weakly.
pub mod store;

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::{self, Arc};

use indexmap::IndexMap;

pub use store::AttributeStore;

use crate::class::{AssignMode, ModelClass};
use crate::error::{CastError, Result};
use crate::property::PropertyDescriptor;
use crate::typecast;
use crate::validation::Errors;
use crate::value::{ProjectionOptions, Value};

/// Upper bound when walking back-references.
const MAX_DEPTH: usize = 1024;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone)]
pub struct Model(Rc<RefCell<ModelInner>>);

/// Non-owning handle used for back-references.
#[derive(Clone, Default)]
pub struct WeakModel(Weak<RefCell<ModelInner>>);

struct ModelInner {
    class: Arc<ModelClass>,
    attributes: AttributeStore,
    casted_by: WeakModel,
    casted_by_property: sync::Weak<PropertyDescriptor>,
    errors: Errors,
    new_record: bool,
    id: Option<String>,
    rev: Option<String>,
    saved_form: Option<serde_json::Value>,
}

/// Anything that names a declared property: its canonical name or the
/// descriptor itself. Aliases only resolve on the accessor path
/// ([`Model::get`] / [`Model::set`]).
pub trait AttributeKey {
    fn find(&self, class: &ModelClass) -> Option<Arc<PropertyDescriptor>>;
    fn label(&self) -> String;
}

/// A bulk-assignment step that has been cast but not yet stored.
enum Pending {
    Typed(Arc<PropertyDescriptor>, Value),
    Schemaless(String, Value),
}

// ————————————————————————————————————————————————————————————————————————————
// HANDLES
// ————————————————————————————————————————————————————————————————————————————

impl WeakModel {
    pub fn new() -> Self {
        Self(Weak::new())
    }

    pub fn upgrade(&self) -> Option<Model> {
        self.0.upgrade().map(Model)
    }
}

impl fmt::Debug for WeakModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakModel").field(&(self.0.strong_count() > 0)).finish()
    }
}

impl Model {
    pub(crate) fn instantiate(class: Arc<ModelClass>) -> Model {
        Model(Rc::new(RefCell::new(ModelInner {
            class,
            attributes: AttributeStore::default(),
            casted_by: WeakModel::new(),
            casted_by_property: sync::Weak::new(),
            errors: Errors::default(),
            new_record: true,
            id: None,
            rev: None,
            saved_form: None,
        })))
    }

    pub fn class(&self) -> Arc<ModelClass> {
        Arc::clone(&self.0.borrow().class)
    }

    pub fn class_name(&self) -> String {
        self.0.borrow().class.name().to_string()
    }

    /// Same object, not merely equal content.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakModel {
        WeakModel(Rc::downgrade(&self.0))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BACK-REFERENCES
// ————————————————————————————————————————————————————————————————————————————

impl Model {
    /// The object that casted this one, if it is still alive.
    pub fn casted_by(&self) -> Option<Model> {
        self.0.borrow().casted_by.upgrade()
    }

    /// The descriptor this object was casted through.
    pub fn casted_by_property(&self) -> Option<Arc<PropertyDescriptor>> {
        self.0.borrow().casted_by_property.upgrade()
    }

    pub(crate) fn set_casted_by(&self, parent: WeakModel, property: sync::Weak<PropertyDescriptor>) {
        let mut inner = self.0.borrow_mut();
        inner.casted_by = parent;
        inner.casted_by_property = property;
    }

    /// The root of the back-reference chain (self when nothing casted it).
    pub fn base_doc(&self) -> Model {
        let mut current = self.clone();
        for _ in 0..MAX_DEPTH {
            match current.casted_by() {
                Some(parent) => current = parent,
                None => return current,
            }
        }
        tracing::error!(class = %self.class_name(), depth = MAX_DEPTH, "back-reference chain too deep; stopping");
        current
    }

    /// Only documents are persistable roots.
    pub fn is_base_doc(&self) -> bool {
        self.0.borrow().class.is_document()
    }

    /// Some slot of `self` (typed, or a collection item) still holds `child`.
    fn holds(&self, child: &Model) -> bool {
        let inner = self.0.borrow();
        inner
            .attributes
            .typed_entries()
            .any(|(_, value)| direct_models(value).iter().any(|m| m.ptr_eq(child)))
    }

    /// Clear the back-reference of every casted object in a value `self` no
    /// longer stores, unless it was meanwhile re-parented or is still held
    /// through another slot.
    pub(crate) fn release(&self, dropped: &Value) {
        for child in direct_models(dropped) {
            if child.is_child_of(self) && !self.holds(&child) {
                child.set_casted_by(WeakModel::new(), sync::Weak::new());
            }
        }
    }

    fn is_child_of(&self, parent: &Model) -> bool {
        self.casted_by().is_some_and(|p| p.ptr_eq(parent))
    }

    /// Casted objects held directly or through a collection whose
    /// back-reference points at `self`, paired with the owning descriptor.
    pub(crate) fn owned_children(&self) -> Vec<(Arc<PropertyDescriptor>, Model)> {
        let (class, held) = {
            let inner = self.0.borrow();
            let held: Vec<(String, Value)> = inner
                .attributes
                .typed_entries()
                .filter(|(_, v)| matches!(v, Value::Model(_) | Value::Collection(_)))
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            (Arc::clone(&inner.class), held)
        };
        let mut out = Vec::new();
        for (name, value) in held {
            let Some(property) = class.property(&name) else { continue };
            match value {
                Value::Model(child) => {
                    if child.is_child_of(self) {
                        out.push((Arc::clone(property), child));
                    }
                }
                Value::Collection(items) => {
                    for item in items.to_vec() {
                        if let Value::Model(child) = item {
                            if child.is_child_of(self) {
                                out.push((Arc::clone(property), child));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        out
    }
}

/// Casted objects stored directly in `value`: the object itself, or the
/// items of a casted collection.
pub(crate) fn direct_models(value: &Value) -> Vec<Model> {
    match value {
        Value::Model(m) => vec![m.clone()],
        Value::Collection(items) => items
            .to_vec()
            .into_iter()
            .filter_map(|item| match item {
                Value::Model(m) => Some(m),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// `target` is reachable from `value` through stored slots, collections,
/// raw arrays or raw maps. Each object and collection is visited once.
pub(crate) fn reaches(value: &Value, target: &Model) -> bool {
    let mut seen: HashSet<usize> = HashSet::new();
    let mut stack = vec![value.clone()];
    while let Some(next) = stack.pop() {
        match next {
            Value::Model(m) => {
                if m.ptr_eq(target) {
                    return true;
                }
                if !seen.insert(Rc::as_ptr(&m.0) as usize) {
                    continue;
                }
                let Ok(inner) = m.0.try_borrow() else { continue };
                stack.extend(inner.attributes.typed_entries().map(|(_, v)| v.clone()));
                stack.extend(inner.attributes.schemaless_entries().map(|(_, v)| v.clone()));
            }
            Value::Collection(c) => {
                if seen.insert(c.addr()) {
                    stack.extend(c.to_vec());
                }
            }
            Value::Array(xs) => stack.extend(xs),
            Value::Map(m) => stack.extend(m.into_values()),
            _ => {}
        }
    }
    false
}

// ————————————————————————————————————————————————————————————————————————————
// ATTRIBUTES
// ————————————————————————————————————————————————————————————————————————————

impl AttributeKey for &str {
    fn find(&self, class: &ModelClass) -> Option<Arc<PropertyDescriptor>> {
        class.property(self).cloned()
    }
    fn label(&self) -> String {
        self.to_string()
    }
}

impl AttributeKey for String {
    fn find(&self, class: &ModelClass) -> Option<Arc<PropertyDescriptor>> {
        class.property(self).cloned()
    }
    fn label(&self) -> String {
        self.clone()
    }
}

impl AttributeKey for &String {
    fn find(&self, class: &ModelClass) -> Option<Arc<PropertyDescriptor>> {
        class.property(self).cloned()
    }
    fn label(&self) -> String {
        self.to_string()
    }
}

impl AttributeKey for &PropertyDescriptor {
    fn find(&self, class: &ModelClass) -> Option<Arc<PropertyDescriptor>> {
        class.property(self.name()).cloned()
    }
    fn label(&self) -> String {
        self.name().to_string()
    }
}

impl AttributeKey for &Arc<PropertyDescriptor> {
    fn find(&self, class: &ModelClass) -> Option<Arc<PropertyDescriptor>> {
        class.property(self.name()).cloned()
    }
    fn label(&self) -> String {
        self.name().to_string()
    }
}

impl Model {
    fn unknown(&self, name: String) -> CastError {
        CastError::UnknownProperty { class: self.class_name(), name }
    }

    fn resolve<K: AttributeKey>(&self, key: K) -> Result<Arc<PropertyDescriptor>> {
        let class = self.class();
        key.find(&class).ok_or_else(|| self.unknown(key.label()))
    }

    fn resolve_accessor(&self, name: &str) -> Result<Arc<PropertyDescriptor>> {
        let class = self.class();
        class.accessor(name).cloned().ok_or_else(|| self.unknown(name.to_string()))
    }

    /// Stored value, or the default cast and stored on first read.
    fn slot_or_default(&self, property: &Arc<PropertyDescriptor>) -> Value {
        let stored = self.0.borrow().attributes.get(property.name()).cloned();
        if let Some(value) = stored {
            return value;
        }
        let Some(default) = property.default_value() else {
            return Value::Null;
        };
        match typecast::cast(property, self, default) {
            Ok(value) => {
                self.0.borrow_mut().attributes.insert(property.name(), value.clone());
                value
            }
            Err(err) => {
                tracing::warn!(class = %self.class_name(), property = %property, %err, "default failed to cast");
                Value::Null
            }
        }
    }

    /// Read by canonical name, bypassing aliases and access modifiers.
    pub fn read_attribute<K: AttributeKey>(&self, key: K) -> Result<Value> {
        let property = self.resolve(key)?;
        Ok(self.slot_or_default(&property))
    }

    /// Cast and store by canonical name, bypassing access modifiers.
    pub fn write_attribute<K: AttributeKey>(&self, key: K, value: impl Into<Value>) -> Result<()> {
        let property = self.resolve(key)?;
        let value = typecast::convert(&property, Some(self), value.into())?;
        self.store_typed(&property, value);
        Ok(())
    }

    /// Store a converted value, adopt its casted objects and release the
    /// ones it replaces.
    fn store_typed(&self, property: &Arc<PropertyDescriptor>, value: Value) {
        typecast::adopt(property, Some(self), &value);
        let replaced = self.0.borrow_mut().attributes.insert(property.name(), value);
        if let Some(replaced) = replaced {
            self.release(&replaced);
        }
    }

    /// Generated getter: name or alias.
    pub fn get(&self, name: &str) -> Result<Value> {
        let property = self.resolve_accessor(name)?;
        Ok(self.slot_or_default(&property))
    }

    /// Generated setter: name or alias. Read-only properties have none.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let property = self.resolve_accessor(name)?;
        if property.read_only() {
            return Err(CastError::ReadOnly {
                class: self.class_name(),
                property: property.name().to_string(),
            });
        }
        self.write_attribute(&property, value)
    }

    /// Raw store lookup: typed slot for declared names, schemaless otherwise.
    /// Never applies defaults.
    pub fn lookup(&self, key: &str) -> Value {
        let inner = self.0.borrow();
        let found = match inner.class.property(key) {
            Some(_) => inner.attributes.get(key),
            None => inner.attributes.schemaless(key),
        };
        found.cloned().unwrap_or_default()
    }

    /// Drop a stored value so the next read falls back to the default.
    pub fn clear_attribute<K: AttributeKey>(&self, key: K) -> Result<Option<Value>> {
        let property = self.resolve(key)?;
        let removed = self.0.borrow_mut().attributes.remove(property.name());
        if let Some(removed) = &removed {
            self.release(removed);
        }
        Ok(removed)
    }

    /// Empty the store, typed and schemaless alike.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut self.0.borrow_mut().attributes);
        for (_, value) in removed.typed_entries() {
            self.release(value);
        }
    }

    /// The class's descriptors, in declaration order.
    pub fn properties(&self) -> Vec<Arc<PropertyDescriptor>> {
        self.class().properties().to_vec()
    }

    /// Each declared property name with its stored value (`Null` when unset).
    pub fn properties_with_values(&self) -> IndexMap<String, Value> {
        let inner = self.0.borrow();
        inner
            .class
            .properties()
            .iter()
            .map(|p| {
                let value = inner.attributes.get(p.name()).cloned().unwrap_or_default();
                (p.name().to_string(), value)
            })
            .collect()
    }

    /// Snapshot of the store.
    pub fn attribute_store(&self) -> AttributeStore {
        self.0.borrow().attributes.clone()
    }

    pub(crate) fn store_schemaless(&self, key: &str, value: Value) {
        self.0.borrow_mut().attributes.insert_schemaless(key, value);
    }

    /// Seed every property that has a default and no stored value.
    pub(crate) fn apply_defaults(&self) -> Result<()> {
        for property in self.properties() {
            if self.0.borrow().attributes.contains(property.name()) {
                continue;
            }
            if let Some(default) = property.default_value() {
                let value = typecast::cast(&property, self, default)?;
                self.0.borrow_mut().attributes.insert(property.name(), value);
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BULK ASSIGNMENT
// ————————————————————————————————————————————————————————————————————————————

impl Model {
    /// Cast every entry before anything is stored or re-parented, so a
    /// failing key leaves the object and its would-be children untouched.
    fn plan(&self, attrs: IndexMap<String, Value>, explicit: bool) -> Result<Vec<Pending>> {
        let class = self.class();
        if explicit {
            let missing = attrs.keys().find(|key| {
                !class.has_setter(key)
                    && (class.accessor(key).is_some() || class.assign_mode() == AssignMode::Strict)
            });
            if let Some(key) = missing {
                return Err(CastError::MissingSetter { class: class.name().to_string(), key: key.clone() });
            }
        }
        let mut pending = Vec::with_capacity(attrs.len());
        for (key, raw) in attrs {
            match class.accessor(&key) {
                Some(property) if property.read_only() => {
                    tracing::debug!(class = class.name(), %key, "skipping read-only key");
                }
                Some(property) if property.protected() => {
                    tracing::debug!(class = class.name(), %key, "skipping protected key");
                }
                Some(property) => {
                    let value = typecast::convert(property, Some(self), raw)?;
                    pending.push(Pending::Typed(Arc::clone(property), value));
                }
                None => match class.assign_mode() {
                    AssignMode::Permissive => {
                        if reaches(&raw, self) {
                            return Err(CastError::CyclicAssignment { property: key });
                        }
                        pending.push(Pending::Schemaless(key, raw));
                    }
                    AssignMode::Strict => {
                        tracing::trace!(class = class.name(), %key, "skipping undeclared key");
                    }
                },
            }
        }
        Ok(pending)
    }

    fn commit(&self, pending: Vec<Pending>) {
        for step in pending {
            match step {
                Pending::Typed(property, value) => self.store_typed(&property, value),
                Pending::Schemaless(key, value) => {
                    self.0.borrow_mut().attributes.insert_schemaless(key, value);
                }
            }
        }
    }

    /// Bulk assignment: protected and read-only keys are skipped; undeclared
    /// keys are skipped (strict) or kept schemaless (permissive).
    pub fn assign_attributes(&self, attrs: IndexMap<String, Value>) -> Result<()> {
        let pending = self.plan(attrs, false)?;
        self.commit(pending);
        Ok(())
    }

    /// Explicit update: every key must have a setter (or be accepted by a
    /// permissive class), otherwise nothing is written.
    pub fn update_attributes_without_saving(&self, attrs: IndexMap<String, Value>) -> Result<()> {
        let pending = self.plan(attrs, true)?;
        self.commit(pending);
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// IDENTITY & STATE
// ————————————————————————————————————————————————————————————————————————————

impl Model {
    pub fn id(&self) -> Option<String> {
        self.0.borrow().id.clone()
    }

    pub fn rev(&self) -> Option<String> {
        self.0.borrow().rev.clone()
    }

    /// Never persisted. Children follow their root.
    pub fn is_new(&self) -> bool {
        self.0.borrow().new_record
    }

    pub(crate) fn set_identity(&self, id: Option<String>, rev: Option<String>) {
        let mut inner = self.0.borrow_mut();
        if id.is_some() {
            inner.id = id;
        }
        if rev.is_some() {
            inner.rev = rev;
        }
    }

    /// Differs from the form last written to or read from a store.
    pub fn changed(&self) -> bool {
        let plain = self.to_plain();
        self.0.borrow().saved_form.as_ref() != Some(&plain)
    }

    pub(crate) fn remember_saved_form(&self) {
        let plain = self.to_plain();
        self.0.borrow_mut().saved_form = Some(plain);
    }

    pub(crate) fn mark_persisted(&self) {
        self.0.borrow_mut().new_record = false;
        for (_, child) in self.owned_children() {
            child.mark_persisted();
        }
    }

    /// Messages from the last validation run.
    pub fn errors(&self) -> Errors {
        self.0.borrow().errors.clone()
    }

    pub(crate) fn set_errors(&self, errors: Errors) {
        self.0.borrow_mut().errors = errors;
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PROJECTION
// ————————————————————————————————————————————————————————————————————————————

impl Model {
    pub fn to_plain(&self) -> serde_json::Value {
        let fraction_digits = self.0.borrow().class.time_fraction_digits();
        self.to_plain_with(&ProjectionOptions { fraction_digits, only: None })
    }

    /// Plain key→value form. Documents lead with the type key and identity;
    /// declared properties follow in declaration order, then schemaless keys.
    /// `Null` slots are omitted.
    pub fn to_plain_with(&self, options: &ProjectionOptions) -> serde_json::Value {
        use serde_json::Value as J;
        let inner = self.0.borrow();
        let nested = options.nested();
        let mut out = serde_json::Map::new();
        let class = &inner.class;
        if class.is_document() {
            if options.admits(class.type_key()) {
                out.insert(class.type_key().to_string(), J::String(class.name().to_string()));
            }
            if let (Some(id), true) = (&inner.id, options.admits("_id")) {
                out.insert("_id".to_string(), J::String(id.clone()));
            }
            if let (Some(rev), true) = (&inner.rev, options.admits("_rev")) {
                out.insert("_rev".to_string(), J::String(rev.clone()));
            }
        }
        for property in class.properties() {
            if !options.admits(property.name()) {
                continue;
            }
            match inner.attributes.get(property.name()) {
                Some(value) if !value.is_null() => {
                    out.insert(property.name().to_string(), value.to_json(&nested));
                }
                _ => {}
            }
        }
        for (key, value) in inner.attributes.schemaless_entries() {
            if options.admits(key) && !value.is_null() {
                out.insert(key.to_string(), value.to_json(&nested));
            }
        }
        J::Object(out)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(inner) => f
                .debug_struct("Model")
                .field("class", &inner.class.name())
                .field("id", &inner.id)
                .field("attributes", &inner.attributes)
                .finish_non_exhaustive(),
            Err(_) => f.write_str("Model(<borrowed>)"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
