//! The schema: an immutable table of model classes shared by every instance.
//!
//! Classes are declared with [`ModelClassBuilder`] (or loaded from a JSON
//! schema file) and frozen by [`SchemaBuilder::build`], which also binds every
//! model-typed property to its target class. The schema must outlive the
//! objects created from it; classes only hold weak links to each other.
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::class::{ClassKind, ClassLink, DEFAULT_MODEL_TYPE_KEY, ModelClass, ModelClassBuilder};
use crate::error::{CastError, Result, SchemaError};
use crate::model::Model;
use crate::path_de::from_str_with_path;
use crate::property::{PropertyBuilder, PropertyType, TypeClass};
use crate::value::ProjectionOptions;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Schema-wide defaults. Classes may override the type key and assignment mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub model_type_key: String,
    pub time_fraction_digits: usize,
    pub mass_assign_any_attribute: bool,
}

#[derive(Debug)]
pub struct Schema {
    classes: IndexMap<String, Arc<ModelClass>>,
    settings: Settings,
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    settings: Settings,
    builders: Vec<ModelClassBuilder>,
}

// ---- Schema file ---- //

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    #[serde(default)]
    pub settings: Settings,
    pub classes: Vec<ClassDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassDef {
    pub name: String,
    #[serde(default)]
    pub kind: ClassKind,
    #[serde(default)]
    pub type_key: Option<String>,
    #[serde(default)]
    pub mass_assign_any_attribute: Option<bool>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub validates_presence_of: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyDef {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<TypeDef>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub init_method: Option<String>,
}

/// `"Date"` for a scalar, `["Date"]` for an array, `[]` for an untyped array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TypeDef {
    Scalar(String),
    Array(Vec<String>),
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_type_key: DEFAULT_MODEL_TYPE_KEY.to_string(),
            time_fraction_digits: 3,
            mass_assign_any_attribute: false,
        }
    }
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn class(&self, name: &str) -> Option<Arc<ModelClass>> {
        self.classes.get(name).cloned()
    }

    /// Classes in declaration order; nested anonymous classes follow their owners.
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ModelClass>> {
        self.classes.values()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn projection_options(&self) -> ProjectionOptions {
        ProjectionOptions { fraction_digits: self.settings.time_fraction_digits, only: None }
    }

    /// Load a persisted document, picking the class from its type key.
    pub fn load_document(&self, doc: &serde_json::Value) -> Result<Model> {
        let key = &self.settings.model_type_key;
        let Some(name) = doc.get(key).and_then(|v| v.as_str()) else {
            return Err(CastError::Build {
                type_name: "document".to_string(),
                reason: format!("missing `{key}` discriminator"),
            });
        };
        let Some(class) = self.class(name) else {
            return Err(CastError::Build {
                type_name: name.to_string(),
                reason: "class is not declared in the schema".to_string(),
            });
        };
        class.load(doc)
    }

    pub fn from_json_str(src: &str) -> std::result::Result<Schema, SchemaError> {
        from_str_with_path::<SchemaFile>(src)?.into_schema()
    }

    pub fn from_path(path: impl AsRef<Path>) -> std::result::Result<Schema, SchemaError> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&src)
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn class(mut self, class: ModelClassBuilder) -> std::result::Result<Self, SchemaError> {
        if self.builders.iter().any(|b| b.name() == class.name()) {
            return Err(SchemaError::DuplicateClass { name: class.name().to_string() });
        }
        self.builders.push(class);
        Ok(self)
    }

    /// Freeze every class, then bind model-typed properties to their targets.
    pub fn build(self) -> std::result::Result<Schema, SchemaError> {
        let mut queue: VecDeque<ModelClassBuilder> = self.builders.into();
        let mut classes: IndexMap<String, Arc<ModelClass>> = IndexMap::new();
        let mut links: Vec<(String, String, ClassLink)> = Vec::new();
        while let Some(builder) = queue.pop_front() {
            for (property, link) in builder.links() {
                links.push((builder.name().to_string(), property.to_string(), link.clone()));
            }
            let (class, nested) = builder.finish(&self.settings)?;
            if classes.contains_key(class.name()) {
                return Err(SchemaError::DuplicateClass { name: class.name().to_string() });
            }
            // nested classes go right after their owner
            for inner in nested.into_iter().rev() {
                queue.push_front(inner);
            }
            classes.insert(class.name().to_string(), Arc::new(class));
        }
        for (class, property, link) in links {
            let Some(target) = classes.get(link.name()) else {
                return Err(SchemaError::UnknownClass { class, property, name: link.name().to_string() });
            };
            if !link.bind(target) && !link.is_class(target) {
                tracing::warn!(%class, %property, target = link.name(), "property is already bound to another schema");
            }
        }
        tracing::debug!(classes = classes.len(), "schema built");
        Ok(Schema { classes, settings: self.settings })
    }
}

impl SchemaFile {
    pub fn into_schema(self) -> std::result::Result<Schema, SchemaError> {
        let mut builder = SchemaBuilder::new().with_settings(self.settings);
        for class in self.classes {
            builder = builder.class(class.into_builder()?)?;
        }
        builder.build()
    }
}

impl ClassDef {
    pub fn into_builder(self) -> std::result::Result<ModelClassBuilder, SchemaError> {
        let mut builder = match self.kind {
            ClassKind::Document => ModelClassBuilder::document(self.name),
            ClassKind::Embeddable => ModelClassBuilder::embeddable(self.name),
        };
        if let Some(key) = self.type_key {
            builder = builder.type_key(key)?;
        }
        if let Some(any) = self.mass_assign_any_attribute {
            builder = builder.mass_assign_any_attribute(any);
        }
        for property in self.properties {
            builder = builder.property(property.into_builder()?)?;
        }
        for name in self.validates_presence_of {
            builder = builder.validates_presence_of(name);
        }
        Ok(builder)
    }
}

impl PropertyDef {
    pub fn into_builder(self) -> std::result::Result<PropertyBuilder, SchemaError> {
        let ty = match &self.ty {
            None => PropertyType::Untyped,
            Some(ty) => ty.to_type(&self.name)?,
        };
        let mut builder = PropertyBuilder::new(self.name)
            .of_type(ty)
            .read_only(self.read_only)
            .protected(self.protected);
        if let Some(default) = self.default {
            builder = builder.default_json(default);
        }
        if let Some(alias) = self.alias {
            builder = builder.alias(alias);
        }
        if let Some(method) = self.init_method {
            builder = builder.init_method(method);
        }
        Ok(builder)
    }
}

impl TypeDef {
    pub fn to_type(&self, property: &str) -> std::result::Result<PropertyType, SchemaError> {
        match self {
            TypeDef::Scalar(name) if name.trim().is_empty() => Err(SchemaError::BadType {
                property: property.to_string(),
                reason: "empty type name".to_string(),
            }),
            TypeDef::Scalar(name) => Ok(PropertyType::Scalar(TypeClass::from_name(name))),
            TypeDef::Array(names) => match names.as_slice() {
                [] => Ok(PropertyType::ArrayOf(TypeClass::Object)),
                [name] => Ok(PropertyType::ArrayOf(TypeClass::from_name(name))),
                _ => Err(SchemaError::BadType {
                    property: property.to_string(),
                    reason: format!("an array type names one element class, got {}", names.len()),
                }),
            },
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
