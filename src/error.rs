//! Error kinds surfaced by casting, schema declaration and persistence.
use thiserror::Error;

/// Failures raised while casting, reading or writing attributes.
///
/// None of these are retried internally: they are input-shape or programming
/// errors and go straight back to the immediate caller.
#[derive(Debug, Error)]
pub enum CastError {
    /// `read_attribute` / `write_attribute` (or an accessor) named a property
    /// the class does not declare.
    #[error("unknown property `{name}` for {class}")]
    UnknownProperty { class: String, name: String },

    /// Nothing to construct (untyped property) or the construction method failed.
    #[error("Cannot build {type_name}: {reason}")]
    Build { type_name: String, reason: String },

    /// A single value was assigned to an array-typed property.
    #[error("Expecting an array or keyed hash for property {class}#{property}")]
    ExpectingArray { class: String, property: String },

    /// A keyed hash assigned to an array property had a key that is not an index.
    #[error("keyed hash for property {property} has non-numeric key `{key}`")]
    NonNumericKey { property: String, key: String },

    /// Explicit update named a key with no public setter on a strict class.
    #[error("{class} has no setter for `{key}`")]
    MissingSetter { class: String, key: String },

    /// The generated setter was invoked on a read-only property.
    #[error("property {class}#{property} is read-only")]
    ReadOnly { class: String, property: String },

    /// The value is the owner itself or one of its ancestors.
    #[error("assigning to {property} would make an object its own ancestor")]
    CyclicAssignment { property: String },

    /// Persistence or a document-only operation was requested on an embeddable class.
    #[error("{class} is not a document class")]
    NotADocument { class: String },

    /// Strict save of a document that failed validation.
    #[error("{class} is invalid: {errors}")]
    Invalid { class: String, errors: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures raised while declaring classes and properties.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("property `{name}` on {class}: `{key}` is already used as the model type key")]
    ReservedName { class: String, name: String, key: String },

    #[error("property `{name}` is already declared on {class}")]
    DuplicateProperty { class: String, name: String },

    #[error("class `{name}` is declared twice")]
    DuplicateClass { name: String },

    #[error("property `{property}` on {class} refers to unknown class `{name}`")]
    UnknownClass { class: String, property: String, name: String },

    #[error("property `{property}` has an invalid type: {reason}")]
    BadType { property: String, reason: String },

    #[error("at JSON path {path} → {message}")]
    Parse { path: String, message: String },

    #[error("failed to read schema file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by a [`crate::persist::DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document `{id}` was updated concurrently (stale revision)")]
    Conflict { id: String },

    #[error("document `{id}` not found")]
    NotFound { id: String },

    #[error("expected a JSON object for document, got {found}")]
    NotAnObject { found: &'static str },
}

pub type Result<T> = std::result::Result<T, CastError>;
