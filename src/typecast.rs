//! The type caster: `(descriptor, owner, raw) -> typed value`.
//!
//! - Untyped properties pass values through untouched.
//! - Array properties accept sequences, casted collections, or keyed hashes
//!   (form-style `{"0": .., "1": ..}`, sorted by numeric key), and always
//!   produce a [`CastedCollection`] owned by `owner`.
//! - Scalars reuse a value that already is an instance of the target class and
//!   construct one otherwise.
//!
//! Casting is split in two: [`convert`] builds the typed value and may fail,
//! [`adopt`] then points casted objects at the owner (never at an
//! intermediate collection). A value that already holds the owner is
//! rejected up front.
pub mod scalar;
pub mod time;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::collection::CastedCollection;
use crate::error::{CastError, Result};
use crate::model::{self, Model};
use crate::property::{Construct, PropertyDescriptor, PropertyType};
use crate::value::Value;

// ------------------------------- Cast ------------------------------------- //

/// Cast `raw` for storage on `owner` and point casted objects at it.
pub fn cast(descriptor: &Arc<PropertyDescriptor>, owner: &Model, raw: Value) -> Result<Value> {
    let value = convert(descriptor, Some(owner), raw)?;
    adopt(descriptor, Some(owner), &value);
    Ok(value)
}

/// Cast without touching any back-reference. Nothing is re-parented until
/// the caller hands the result to [`adopt`].
pub(crate) fn convert(
    descriptor: &Arc<PropertyDescriptor>,
    owner: Option<&Model>,
    raw: Value,
) -> Result<Value> {
    if let Some(owner) = owner {
        check_cycle(descriptor, owner, &raw)?;
    }
    match descriptor.ty() {
        PropertyType::Untyped => Ok(raw),
        PropertyType::ArrayOf(_) => convert_array(descriptor, owner, raw),
        PropertyType::Scalar(_) => convert_element(descriptor, raw),
    }
}

/// Cast one element for an array property (or a scalar) and adopt it.
pub(crate) fn cast_element(
    descriptor: &Arc<PropertyDescriptor>,
    owner: Option<&Model>,
    raw: Value,
) -> Result<Value> {
    if let Some(owner) = owner {
        check_cycle(descriptor, owner, &raw)?;
    }
    let value = convert_element(descriptor, raw)?;
    adopt(descriptor, owner, &value);
    Ok(value)
}

/// `raw` may not already hold `owner` anywhere below it.
pub(crate) fn check_cycle(descriptor: &PropertyDescriptor, owner: &Model, raw: &Value) -> Result<()> {
    if model::reaches(raw, owner) {
        tracing::debug!(property = %descriptor, class = %owner.class_name(), "rejected cyclic assignment");
        return Err(CastError::CyclicAssignment { property: descriptor.name().to_string() });
    }
    Ok(())
}

/// Point the casted objects of `value` (itself, or the items of a casted
/// collection) at `owner`. Untyped slots keep no back-reference.
pub(crate) fn adopt(descriptor: &Arc<PropertyDescriptor>, owner: Option<&Model>, value: &Value) {
    if !descriptor.is_casted() {
        return;
    }
    let parent = owner.map(Model::downgrade).unwrap_or_default();
    for child in model::direct_models(value) {
        child.set_casted_by(parent.clone(), Arc::downgrade(descriptor));
    }
}

fn convert_array(
    descriptor: &Arc<PropertyDescriptor>,
    owner: Option<&Model>,
    raw: Value,
) -> Result<Value> {
    let items = match raw {
        Value::Null => Vec::new(),
        Value::Array(xs) => xs,
        Value::Collection(c) => c.to_vec(),
        Value::Map(m) => keyed_to_sequence(descriptor, m)?,
        other => {
            tracing::debug!(property = %descriptor, kind = other.kind_name(), "rejected non-sequence for array property");
            return Err(CastError::ExpectingArray {
                class: owner.map(|o| o.class_name()).unwrap_or_default(),
                property: descriptor.name().to_string(),
            });
        }
    };
    let casted = items
        .into_iter()
        .map(|item| convert_element(descriptor, item))
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::Collection(CastedCollection::new(casted, descriptor, owner)))
}

/// Reuse a value that already is an instance of the type class, construct
/// one otherwise.
fn convert_element(descriptor: &PropertyDescriptor, raw: Value) -> Result<Value> {
    let Some(class) = descriptor.type_class() else {
        return Ok(raw);
    };
    if raw.is_null() {
        return Ok(raw);
    }
    if class.is_instance(&raw) {
        tracing::trace!(property = %descriptor, class = class.name(), "reusing already-typed value");
        return Ok(raw);
    }
    tracing::trace!(property = %descriptor, class = class.name(), from = raw.kind_name(), "constructing value");
    construct(descriptor, vec![raw])
}

/// Order a keyed hash by numeric key: `"0", "1", "10"`, never lexically.
fn keyed_to_sequence(
    descriptor: &PropertyDescriptor,
    map: IndexMap<String, Value>,
) -> Result<Vec<Value>> {
    let mut keyed = Vec::with_capacity(map.len());
    for (key, value) in map {
        let Ok(index) = key.trim().parse::<i64>() else {
            return Err(CastError::NonNumericKey {
                property: descriptor.name().to_string(),
                key,
            });
        };
        keyed.push((index, value));
    }
    // stable: equal indices ("1" and "01") keep their input order
    keyed.sort_by_key(|(index, _)| *index);
    Ok(keyed.into_iter().map(|(_, v)| v).collect())
}

// ----------------------------- Construct ---------------------------------- //

/// Build a `T` for the descriptor from positional arguments.
pub fn construct(descriptor: &PropertyDescriptor, args: Vec<Value>) -> Result<Value> {
    let Some(class) = descriptor.type_class() else {
        return Err(CastError::Build {
            type_name: descriptor.name().to_string(),
            reason: "property has no class to construct".to_string(),
        });
    };
    match descriptor.construction() {
        Construct::Default => scalar::construct_default(class, args),
        Construct::Named(method) => scalar::construct_named(class, method, args),
        Construct::Callable(f) => f(&args).map_err(|reason| CastError::Build {
            type_name: class.name().to_string(),
            reason,
        }),
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropertyBuilder, TypeClass};
    use crate::schema::SchemaBuilder;
    use crate::class::ModelClassBuilder;
    use chrono::NaiveDate;
    use serde_json::json;

    fn parent() -> (crate::schema::Schema, Model) {
        let schema = SchemaBuilder::new()
            .class(ModelClassBuilder::embeddable("Foo"))
            .unwrap()
            .build()
            .unwrap();
        let foo = schema.class("Foo").unwrap().instantiate().unwrap();
        (schema, foo)
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn casts_a_scalar() {
        let (_schema, foo) = parent();
        let p = Arc::new(PropertyBuilder::new("test").scalar(TypeClass::Date).build());
        assert_eq!(cast(&p, &foo, "2010-06-16".into()).unwrap(), date(2010, 6, 16));
        assert_eq!(p.cast_value(&foo, "2010-06-16".into()).unwrap(), date(2010, 6, 16));
    }

    #[test]
    fn casts_an_array_into_a_collection_owned_by_the_parent() {
        let (_schema, foo) = parent();
        let p = Arc::new(PropertyBuilder::new("test").array_of(TypeClass::Date).build());
        let out = cast(&p, &foo, Value::from_json(&json!(["2010-06-01", "2010-06-02"]))).unwrap();
        let c = out.as_collection().unwrap();
        assert_eq!(c.to_vec(), vec![date(2010, 6, 1), date(2010, 6, 2)]);
        assert!(c.casted_by().unwrap().ptr_eq(&foo));
    }

    #[test]
    fn keyed_hash_sorts_numerically() {
        let (_schema, foo) = parent();
        let p = Arc::new(PropertyBuilder::new("test").array_of(TypeClass::String).build());
        let raw = Value::from_json(&json!({"10": "a", "0": "b", "1": "c"}));
        let out = cast(&p, &foo, raw).unwrap();
        assert_eq!(out, Value::from_json(&json!(["b", "c", "a"])));
    }

    #[test]
    fn keyed_hash_with_non_numeric_key_fails() {
        let (_schema, foo) = parent();
        let p = Arc::new(PropertyBuilder::new("test").array_of(TypeClass::String).build());
        let raw = Value::from_json(&json!({"0": "a", "x": "b"}));
        assert!(matches!(cast(&p, &foo, raw), Err(CastError::NonNumericKey { key, .. }) if key == "x"));
    }

    #[test]
    fn single_value_for_array_fails() {
        let (_schema, foo) = parent();
        let p = Arc::new(PropertyBuilder::new("test").array_of(TypeClass::String).build());
        let err = cast(&p, &foo, "solo".into()).unwrap_err();
        assert!(err.to_string().contains("Expecting an array"), "{err}");
    }

    #[test]
    fn null_array_is_empty_collection_and_null_scalar_stays_null() {
        let (_schema, foo) = parent();
        let p = Arc::new(PropertyBuilder::new("test").array_of(TypeClass::Object).build());
        assert!(cast(&p, &foo, Value::Null).unwrap().as_collection().unwrap().is_empty());
        let p = Arc::new(PropertyBuilder::new("test").scalar(TypeClass::Integer).build());
        assert_eq!(cast(&p, &foo, Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn untyped_passes_through() {
        let (_schema, foo) = parent();
        let p = Arc::new(PropertyDescriptor::new("test", PropertyType::Untyped));
        let raw = Value::from_json(&json!({"name": "Sam"}));
        assert_eq!(cast(&p, &foo, raw.clone()).unwrap(), raw);
    }

    #[test]
    fn callable_can_wrap_an_array_input() {
        let (_schema, foo) = parent();
        let p = Arc::new(
            PropertyBuilder::new("test")
                .scalar(TypeClass::Hash)
                .init_with(|args| {
                    let mut m = IndexMap::new();
                    m.insert("ary".to_string(), args.first().cloned().unwrap_or_default());
                    Ok(Value::Map(m))
                })
                .build(),
        );
        let out = cast(&p, &foo, Value::from_json(&json!([1, 2]))).unwrap();
        assert_eq!(out.as_map().unwrap()["ary"], Value::from_json(&json!([1, 2])));
    }
}
