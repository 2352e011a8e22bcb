//! Model classes: a named, fixed table of property descriptors plus the
//! per-class policies (document vs embeddable, strict vs permissive
//! assignment, validation rules).
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{CastError, Result, SchemaError};
use crate::model::Model;
use crate::property::{Callable, PropertyBuilder, PropertyDescriptor, PropertyType, TypeClass};
use crate::schema::Settings;
use crate::validation::{Hook, Rule};
use crate::value::Value;

pub const DEFAULT_MODEL_TYPE_KEY: &str = "type";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Documents are persistable roots and carry a type discriminator;
/// embeddables only ever live inside another object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Document,
    #[default]
    Embeddable,
}

/// What bulk assignment does with keys that have no public setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignMode {
    /// Skip them (bulk) or fail (explicit update).
    #[default]
    Strict,
    /// Keep them in the schemaless slot.
    Permissive,
}

/// Late-bound, non-owning reference from a property type to a model class.
///
/// Links are filled in once when the owning [`crate::schema::Schema`] is
/// built, which lets classes refer to each other (or to themselves) without
/// strong reference cycles.
#[derive(Clone)]
pub struct ClassLink {
    name: String,
    target: Arc<OnceCell<Weak<ModelClass>>>,
}

pub struct ModelClass {
    name: String,
    kind: ClassKind,
    properties: Vec<Arc<PropertyDescriptor>>,
    by_name: HashMap<String, usize>,
    by_accessor: HashMap<String, usize>,
    assign_mode: AssignMode,
    type_key: String,
    fraction_digits: usize,
    rules: Vec<Rule>,
    before_validation: Vec<Hook>,
    after_validation: Vec<Hook>,
    after_initialize: Vec<Hook>,
    factories: IndexMap<String, Callable>,
}

/// Unset policies fall back to the schema [`Settings`] when the class is frozen.
pub struct ModelClassBuilder {
    name: String,
    kind: ClassKind,
    properties: Vec<PropertyDescriptor>,
    assign_mode: Option<AssignMode>,
    type_key: Option<String>,
    rules: Vec<Rule>,
    before_validation: Vec<Hook>,
    after_validation: Vec<Hook>,
    after_initialize: Vec<Hook>,
    factories: IndexMap<String, Callable>,
    nested: Vec<ModelClassBuilder>,
}

// ————————————————————————————————————————————————————————————————————————————
// CLASS LINK
// ————————————————————————————————————————————————————————————————————————————

impl ClassLink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), target: Arc::new(OnceCell::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn bind(&self, class: &Arc<ModelClass>) -> bool {
        self.target.set(Arc::downgrade(class)).is_ok()
    }

    pub fn is_bound(&self) -> bool {
        self.target.get().is_some()
    }

    pub fn resolve(&self) -> Result<Arc<ModelClass>> {
        self.target.get().and_then(Weak::upgrade).ok_or_else(|| CastError::Build {
            type_name: self.name.clone(),
            reason: "class is not registered in a live schema".to_string(),
        })
    }

    pub fn is_class(&self, class: &ModelClass) -> bool {
        match self.target.get().and_then(Weak::upgrade) {
            Some(target) => std::ptr::eq(Arc::as_ptr(&target), class),
            None => self.name == class.name(),
        }
    }
}

impl fmt::Debug for ClassLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassLink")
            .field("name", &self.name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MODEL CLASS
// ————————————————————————————————————————————————————————————————————————————

impl ModelClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn is_document(&self) -> bool {
        self.kind == ClassKind::Document
    }

    /// The declared descriptors, in declaration order.
    pub fn properties(&self) -> &[Arc<PropertyDescriptor>] {
        &self.properties
    }

    /// Lookup by canonical name only (the `read_attribute` path).
    pub fn property(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.by_name.get(name).map(|&i| &self.properties[i])
    }

    /// Lookup by name or alias (the generated accessor path).
    pub fn accessor(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.by_accessor.get(name).map(|&i| &self.properties[i])
    }

    /// A public setter exists for `name`: declared (or aliased) and writable.
    pub fn has_setter(&self, name: &str) -> bool {
        self.accessor(name).is_some_and(|p| !p.read_only())
    }

    pub fn assign_mode(&self) -> AssignMode {
        self.assign_mode
    }

    /// Reserved key holding the class name in a document's plain form.
    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Fractional second digits used when projecting times.
    pub fn time_fraction_digits(&self) -> usize {
        self.fraction_digits
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn before_validation(&self) -> &[Hook] {
        &self.before_validation
    }

    pub fn after_validation(&self) -> &[Hook] {
        &self.after_validation
    }

    pub fn factory(&self, name: &str) -> Option<&Callable> {
        self.factories.get(name)
    }

    /// Fresh instance with defaults applied, then `attrs` bulk-assigned.
    pub fn new_instance(self: &Arc<Self>, attrs: IndexMap<String, Value>) -> Result<Model> {
        let model = Model::instantiate(Arc::clone(self));
        model.apply_defaults()?;
        model.assign_attributes(attrs)?;
        self.run_after_initialize(&model);
        Ok(model)
    }

    /// Fresh instance with defaults only.
    pub fn instantiate(self: &Arc<Self>) -> Result<Model> {
        self.new_instance(IndexMap::new())
    }

    /// Load an instance from its persisted (plain) form.
    ///
    /// Every declared key is written through `write_attribute`, so read-only
    /// and protected properties are populated too. The type discriminator is
    /// consumed; other unknown keys are kept in the schemaless slot.
    pub fn load(self: &Arc<Self>, doc: &serde_json::Value) -> Result<Model> {
        let serde_json::Value::Object(map) = doc else {
            return Err(CastError::Build {
                type_name: self.name.clone(),
                reason: format!("expected an object, got {}", Value::from_json(doc).kind_name()),
            });
        };
        let model = Model::instantiate(Arc::clone(self));
        model.apply_defaults()?;
        for (key, raw) in map {
            match key.as_str() {
                "_id" => model.set_identity(raw.as_str().map(str::to_string), None),
                "_rev" => model.set_identity(None, raw.as_str().map(str::to_string)),
                k if self.is_document() && k == self.type_key => {}
                k => match self.property(k) {
                    Some(property) => model.write_attribute(property, Value::from_json(raw))?,
                    None => model.store_schemaless(k, Value::from_json(raw)),
                },
            }
        }
        self.run_after_initialize(&model);
        model.mark_persisted();
        model.remember_saved_form();
        tracing::debug!(class = %self.name, id = ?model.id(), "loaded instance");
        Ok(model)
    }
}

impl ModelClass {
    fn run_after_initialize(&self, model: &Model) {
        for hook in &self.after_initialize {
            hook(model);
        }
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("properties", &self.properties.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("assign_mode", &self.assign_mode)
            .finish_non_exhaustive()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDER
// ————————————————————————————————————————————————————————————————————————————

impl ModelClassBuilder {
    fn new(name: impl Into<String>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: Vec::new(),
            assign_mode: None,
            type_key: None,
            rules: Vec::new(),
            before_validation: Vec::new(),
            after_validation: Vec::new(),
            after_initialize: Vec::new(),
            factories: IndexMap::new(),
            nested: Vec::new(),
        }
    }

    pub fn document(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Document)
    }

    pub fn embeddable(name: impl Into<String>) -> Self {
        Self::new(name, ClassKind::Embeddable)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a property. On documents the name may not shadow the type key.
    pub fn property(mut self, property: PropertyBuilder) -> std::result::Result<Self, SchemaError> {
        let property = property.build();
        self.check_reserved(property.name())?;
        let taken = |n: &str| {
            self.properties.iter().any(|p| p.name() == n || p.alias() == Some(n))
        };
        if taken(property.name()) || property.alias().is_some_and(taken) {
            return Err(SchemaError::DuplicateProperty {
                class: self.name.clone(),
                name: property.name().to_string(),
            });
        }
        self.properties.push(property);
        Ok(self)
    }

    /// Declare a property typed by an anonymous embeddable class whose own
    /// properties are declared by `declare`.
    pub fn nested<F>(mut self, name: &str, array: bool, declare: F) -> std::result::Result<Self, SchemaError>
    where
        F: FnOnce(ModelClassBuilder) -> std::result::Result<ModelClassBuilder, SchemaError>,
    {
        let inner = declare(ModelClassBuilder::embeddable(format!("{}::{}", self.name, name)))?;
        let property = PropertyBuilder::new(name);
        let property = if array {
            property.array_of_models(inner.name())
        } else {
            property.model(inner.name())
        };
        self.nested.push(inner);
        self.property(property)
    }

    pub fn assign_mode(mut self, mode: AssignMode) -> Self {
        self.assign_mode = Some(mode);
        self
    }

    /// Shorthand for permissive (`true`) or strict (`false`) bulk assignment.
    pub fn mass_assign_any_attribute(self, enabled: bool) -> Self {
        self.assign_mode(if enabled { AssignMode::Permissive } else { AssignMode::Strict })
    }

    pub fn type_key(mut self, key: impl Into<String>) -> std::result::Result<Self, SchemaError> {
        self.type_key = Some(key.into());
        for p in &self.properties {
            self.check_reserved(p.name())?;
        }
        Ok(self)
    }

    pub fn validates_presence_of(mut self, property: impl Into<String>) -> Self {
        self.rules.push(Rule::Presence { property: property.into(), message: None });
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn before_validation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model) + Send + Sync + 'static,
    {
        self.before_validation.push(Arc::new(hook));
        self
    }

    pub fn after_validation<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model) + Send + Sync + 'static,
    {
        self.after_validation.push(Arc::new(hook));
        self
    }

    /// Runs once an instance has been built or loaded.
    pub fn after_initialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model) + Send + Sync + 'static,
    {
        self.after_initialize.push(Arc::new(hook));
        self
    }

    /// Register a named factory usable as a property's `init_method`.
    pub fn factory<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(f));
        self
    }

    fn check_reserved(&self, name: &str) -> std::result::Result<(), SchemaError> {
        self.check_reserved_against(name, self.type_key.as_deref().unwrap_or(DEFAULT_MODEL_TYPE_KEY))
    }

    fn check_reserved_against(&self, name: &str, key: &str) -> std::result::Result<(), SchemaError> {
        if self.kind == ClassKind::Document && name == key {
            return Err(SchemaError::ReservedName {
                class: self.name.clone(),
                name: name.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Names of model classes referenced by the declared properties.
    pub(crate) fn links(&self) -> impl Iterator<Item = (&str, &ClassLink)> {
        self.properties.iter().filter_map(|p| match p.ty() {
            PropertyType::Scalar(TypeClass::Model(link))
            | PropertyType::ArrayOf(TypeClass::Model(link)) => Some((p.name(), link)),
            _ => None,
        })
    }

    /// Split off anonymous nested classes and freeze this one.
    pub(crate) fn finish(
        mut self,
        settings: &Settings,
    ) -> std::result::Result<(ModelClass, Vec<ModelClassBuilder>), SchemaError> {
        let type_key = self.type_key.take().unwrap_or_else(|| settings.model_type_key.clone());
        for p in &self.properties {
            self.check_reserved_against(p.name(), &type_key)?;
        }
        let assign_mode = self.assign_mode.unwrap_or(if settings.mass_assign_any_attribute {
            AssignMode::Permissive
        } else {
            AssignMode::Strict
        });
        let nested = std::mem::take(&mut self.nested);
        let mut by_name = HashMap::new();
        let mut by_accessor = HashMap::new();
        for (i, p) in self.properties.iter().enumerate() {
            by_name.insert(p.name().to_string(), i);
            by_accessor.insert(p.name().to_string(), i);
            if let Some(alias) = p.alias() {
                by_accessor.insert(alias.to_string(), i);
            }
        }
        let class = ModelClass {
            name: self.name,
            kind: self.kind,
            properties: self.properties.into_iter().map(Arc::new).collect(),
            by_name,
            by_accessor,
            assign_mode,
            type_key,
            fraction_digits: settings.time_fraction_digits,
            rules: self.rules,
            before_validation: self.before_validation,
            after_validation: self.after_validation,
            after_initialize: self.after_initialize,
            factories: self.factories,
        };
        Ok((class, nested))
    }
}

impl fmt::Debug for ModelClassBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClassBuilder")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
