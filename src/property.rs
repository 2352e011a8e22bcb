//! Property descriptors: the immutable schema entries a class declares once.
use std::fmt;
use std::sync::Arc;

use crate::class::ClassLink;
use crate::error::Result;
use crate::model::Model;
use crate::typecast;
use crate::value::Value;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Declared type of a property.
#[derive(Debug, Clone)]
pub enum PropertyType {
    /// No type: values pass through verbatim.
    Untyped,
    Scalar(TypeClass),
    /// Homogeneous collection of `TypeClass`.
    ArrayOf(TypeClass),
}

/// The classes a value can be cast into.
#[derive(Debug, Clone)]
pub enum TypeClass {
    /// Fully generic: every value is already an instance.
    Object,
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Time,
    Hash,
    /// A nested class with its own attributes and back-reference.
    Model(ClassLink),
}

/// Construction hook supplied at declaration time.
pub type Callable = Arc<dyn Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync>;

/// How a `TypeClass` instance is built from raw input that is not one already.
#[derive(Clone, Default)]
pub enum Construct {
    /// The type's ordinary constructor (`new`).
    #[default]
    Default,
    /// A named factory on the type, e.g. `parse` on `Date`.
    Named(String),
    Callable(Callable),
}

/// A default evaluated afresh for every instance.
#[derive(Clone)]
pub enum DefaultValue {
    Json(serde_json::Value),
    Fn(fn() -> Value),
}

/// One named, typed attribute of a class.
#[derive(Debug)]
pub struct PropertyDescriptor {
    name: String,
    ty: PropertyType,
    default: Option<DefaultValue>,
    read_only: bool,
    protected: bool,
    alias: Option<String>,
    construct: Construct,
}

/// Builder for [`PropertyDescriptor`].
///
/// ```
/// use json_cast::property::{PropertyBuilder, TypeClass};
///
/// let prop = PropertyBuilder::new("born_on")
///     .scalar(TypeClass::Date)
///     .init_method("parse")
///     .build();
/// assert_eq!(prop.init_method(), "parse");
/// ```
#[derive(Debug)]
pub struct PropertyBuilder {
    name: String,
    ty: PropertyType,
    default: Option<DefaultValue>,
    read_only: bool,
    protected: bool,
    alias: Option<String>,
    construct: Construct,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl TypeClass {
    /// Map a declared type name onto a builtin, or a link to a model class.
    pub fn from_name(name: &str) -> TypeClass {
        match name {
            "Object" => TypeClass::Object,
            "String" => TypeClass::String,
            "Integer" => TypeClass::Integer,
            "Float" => TypeClass::Float,
            "Boolean" => TypeClass::Boolean,
            "Date" => TypeClass::Date,
            "Time" => TypeClass::Time,
            "Hash" => TypeClass::Hash,
            other => TypeClass::Model(ClassLink::new(other)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TypeClass::Object => "Object",
            TypeClass::String => "String",
            TypeClass::Integer => "Integer",
            TypeClass::Float => "Float",
            TypeClass::Boolean => "Boolean",
            TypeClass::Date => "Date",
            TypeClass::Time => "Time",
            TypeClass::Hash => "Hash",
            TypeClass::Model(link) => link.name(),
        }
    }

    /// The single "is this already a T?" check used by casting.
    pub fn is_instance(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeClass::Object, _) => true,
            (TypeClass::String, Value::String(_)) => true,
            (TypeClass::Integer, Value::Integer(_)) => true,
            (TypeClass::Float, Value::Float(_)) => true,
            (TypeClass::Boolean, Value::Bool(_)) => true,
            (TypeClass::Date, Value::Date(_)) => true,
            (TypeClass::Time, Value::Time(_)) => true,
            (TypeClass::Hash, Value::Map(_)) => true,
            (TypeClass::Model(link), Value::Model(m)) => link.is_class(&m.class()),
            _ => false,
        }
    }
}

impl PartialEq for TypeClass {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Construct {
    /// Name of the construction method (`new` for the default constructor).
    pub fn method_name(&self) -> &str {
        match self {
            Construct::Default => "new",
            Construct::Named(name) => name,
            Construct::Callable(_) => "<callable>",
        }
    }
}

impl fmt::Debug for Construct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Construct::Default => f.write_str("Default"),
            Construct::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Construct::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

impl DefaultValue {
    pub fn evaluate(&self) -> Value {
        match self {
            DefaultValue::Json(json) => Value::from_json(json),
            DefaultValue::Fn(f) => f(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Json(json) => f.debug_tuple("Json").field(json).finish(),
            DefaultValue::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, ty: PropertyType) -> Self {
        PropertyBuilder::new(name).of_type(ty).build()
    }

    pub fn builder(name: impl Into<String>) -> PropertyBuilder {
        PropertyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &PropertyType {
        &self.ty
    }

    /// `T` for `Scalar(T)` and `ArrayOf(T)`; `None` when untyped.
    pub fn type_class(&self) -> Option<&TypeClass> {
        match &self.ty {
            PropertyType::Untyped => None,
            PropertyType::Scalar(t) | PropertyType::ArrayOf(t) => Some(t),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.ty, PropertyType::ArrayOf(_))
    }

    /// Whether assignment goes through the type caster at all.
    pub fn is_casted(&self) -> bool {
        !matches!(self.ty, PropertyType::Untyped)
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// A freshly evaluated default. Arrays without an explicit default start
    /// out empty.
    pub fn default_value(&self) -> Option<Value> {
        match &self.default {
            Some(d) => Some(d.evaluate()),
            None if self.is_array() => Some(Value::Array(Vec::new())),
            None => None,
        }
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Protected properties are ignored by bulk assignment.
    pub fn protected(&self) -> bool {
        self.protected
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn construction(&self) -> &Construct {
        &self.construct
    }

    pub fn init_method(&self) -> &str {
        self.construct.method_name()
    }

    /// Build a `T` from positional arguments using the configured
    /// construction method.
    pub fn construct(&self, args: Vec<Value>) -> Result<Value> {
        typecast::construct(self, args)
    }

    /// Cast `raw` for storage on `owner`.
    pub fn cast(self: &Arc<Self>, owner: &Model, raw: Value) -> Result<Value> {
        typecast::cast(self, owner, raw)
    }

    /// Cast a single value (one element, for array properties).
    pub fn cast_value(self: &Arc<Self>, owner: &Model, raw: Value) -> Result<Value> {
        typecast::cast_element(self, Some(owner), raw)
    }
}

impl fmt::Display for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl PropertyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: PropertyType::Untyped,
            default: None,
            read_only: false,
            protected: false,
            alias: None,
            construct: Construct::Default,
        }
    }

    pub fn of_type(mut self, ty: PropertyType) -> Self {
        self.ty = ty;
        self
    }

    pub fn scalar(self, class: TypeClass) -> Self {
        self.of_type(PropertyType::Scalar(class))
    }

    pub fn array_of(self, class: TypeClass) -> Self {
        self.of_type(PropertyType::ArrayOf(class))
    }

    /// Scalar link to a model class declared in the same schema.
    pub fn model(self, class: &str) -> Self {
        self.scalar(TypeClass::Model(ClassLink::new(class)))
    }

    pub fn array_of_models(self, class: &str) -> Self {
        self.array_of(TypeClass::Model(ClassLink::new(class)))
    }

    pub fn default_json(mut self, value: serde_json::Value) -> Self {
        self.default = Some(DefaultValue::Json(value));
        self
    }

    pub fn default_fn(mut self, f: fn() -> Value) -> Self {
        self.default = Some(DefaultValue::Fn(f));
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn init_method(mut self, method: impl Into<String>) -> Self {
        self.construct = Construct::Named(method.into());
        self
    }

    pub fn init_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        self.construct = Construct::Callable(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build(self) -> PropertyDescriptor {
        PropertyDescriptor {
            name: self.name,
            ty: self.ty,
            default: self.default,
            read_only: self.read_only,
            protected: self.protected,
            alias: self.alias,
            construct: self.construct,
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
