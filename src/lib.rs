//! Typed attribute casting for JSON documents.
//!
//! A [`schema::Schema`] declares model classes and their properties. Raw
//! values assigned to a [`model::Model`] are cast to each property's declared
//! type; nested objects and collections keep a weak back-reference to the
//! object that owns them, so every node can reach its root document.
pub mod class;
pub mod collection;
pub mod error;
pub mod jq_exec;
pub mod model;
pub mod path_de;
pub mod persist;
pub mod property;
pub mod schema;
pub mod typecast;
pub mod validation;
pub mod value;

pub use class::{AssignMode, ClassKind, ModelClass, ModelClassBuilder};
pub use collection::CastedCollection;
pub use error::{CastError, Result, SchemaError, StoreError};
pub use model::{Model, WeakModel};
pub use persist::{DocumentStore, MemoryStore};
pub use property::{PropertyBuilder, PropertyDescriptor, PropertyType, TypeClass};
pub use schema::{Schema, SchemaBuilder, Settings};
pub use value::Value;
