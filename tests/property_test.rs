mod common;

use std::sync::Arc;

use chrono::{NaiveDate, Timelike};
use json_cast::error::CastError;
use json_cast::persist::MemoryStore;
use json_cast::property::{PropertyBuilder, PropertyDescriptor, PropertyType, TypeClass};
use json_cast::value::{attrs, Value};
use serde_json::json;

use common::{get_model, new, text, SCHEMA};

fn card() -> json_cast::Model {
    new("Card", json!({"first_name": "matt"}))
}

fn strings(xs: &[&str]) -> Value {
    Value::Array(xs.iter().map(|s| Value::from(*s)).collect())
}

// ---- Accessors ---- //

#[test]
fn properties_are_listed_with_values() {
    let card = card();
    let names: Vec<_> = card.properties().iter().map(|p| p.name().to_string()).collect();
    assert!(names.contains(&"first_name".to_string()));
    assert_eq!(card.properties_with_values()["first_name"], Value::from("matt"));
    assert_eq!(text(&card, "first_name"), Value::from("matt"));
}

#[test]
fn aliases_read_and_write_the_same_slot() {
    let card = card();
    card.set("last_name", "Aimonetti").unwrap();
    assert_eq!(text(&card, "family_name"), Value::from("Aimonetti"));
    assert_eq!(text(&card, "family_name"), text(&card, "last_name"));
}

#[test]
fn aliases_work_for_casted_attributes() {
    let card = card();
    card.set("cast_alias", Value::from_json(&json!({"name": ["Aimonetti"]}))).unwrap();
    assert_eq!(get_model(&card, "calias").get("name").unwrap(), strings(&["Aimonetti"]));

    let card = new("Card", json!({"first_name": "matt", "calias": {"name": ["Aimonetti"]}}));
    assert_eq!(get_model(&card, "cast_alias").get("name").unwrap(), strings(&["Aimonetti"]));
}

#[test]
fn read_only_properties_have_no_setter() {
    let card = card();
    assert!(matches!(card.set("read_only_value", "test"), Err(CastError::ReadOnly { .. })));
    card.write_attribute("read_only_value", "foo").unwrap();
    assert_eq!(text(&card, "read_only_value"), Value::from("foo"));
}

#[test]
fn read_and_write_attribute_accept_names_and_descriptors() {
    let card = card();
    card.set("last_name", "Aimonetti").unwrap();
    let last_name = card.properties().into_iter().find(|p| p.name() == "last_name").unwrap();
    assert_eq!(card.read_attribute("last_name").unwrap(), Value::from("Aimonetti"));
    assert_eq!(card.read_attribute(String::from("last_name")).unwrap(), Value::from("Aimonetti"));
    assert_eq!(card.read_attribute(&last_name).unwrap(), Value::from("Aimonetti"));

    card.write_attribute("last_name", "Aimonetti 1").unwrap();
    assert_eq!(text(&card, "last_name"), Value::from("Aimonetti 1"));
    card.write_attribute(&last_name, "Aimonetti 3").unwrap();
    assert_eq!(text(&card, "last_name"), Value::from("Aimonetti 3"));

    assert!(matches!(card.read_attribute("nope"), Err(CastError::UnknownProperty { .. })));
    assert!(matches!(card.write_attribute("nope", 823), Err(CastError::UnknownProperty { .. })));
}

#[test]
fn write_attribute_casts_typed_properties_only() {
    let card = card();
    card.write_attribute("cast_alias", Value::from_json(&json!({"name": ["Sam", "Lown"]}))).unwrap();
    let person = get_model(&card, "cast_alias");
    assert_eq!(person.class_name(), "Person");
    let name = person.get("name").unwrap();
    assert_eq!(name.as_collection().unwrap().last(), Some(Value::from("Lown")));

    card.write_attribute("first_name", Value::from_json(&json!({"name": "Sam"}))).unwrap();
    assert_eq!(text(&card, "first_name").as_map().unwrap()["name"], Value::from("Sam"));
}

// ---- Plain projection ---- //

#[test]
fn plain_form_omits_nulls() {
    let card = card();
    assert_eq!(card.to_plain(), json!({"type": "Card", "first_name": "matt"}));
    card.set("last_name", "Aimonetti").unwrap();
    card.set("last_name", Value::Null).unwrap();
    assert_eq!(card.to_plain(), json!({"type": "Card", "first_name": "matt"}));
}

// ---- Bulk assignment ---- //

#[test]
fn strict_classes_ignore_undeclared_keys() {
    let card = card();
    card.assign_attributes(attrs(json!({"test": "fooobar"}))).unwrap();
    assert_eq!(card.lookup("test"), Value::Null);
    assert!(matches!(
        card.update_attributes_without_saving(attrs(json!({"test": "fooobar"}))),
        Err(CastError::MissingSetter { .. })
    ));
    assert_eq!(card.lookup("test"), Value::Null);
}

#[test]
fn strict_classes_keep_their_revision_after_ignored_updates() {
    let mut store = MemoryStore::new();
    let card = card();
    assert!(card.save(&mut store).unwrap());
    let rev = card.rev();
    assert!(card.update_attributes(attrs(json!({"test": "fooobar"})), &mut store).is_err());
    assert_eq!(card.rev(), rev);
    card.assign_attributes(attrs(json!({"test": "fooobar"}))).unwrap();
    card.save(&mut store).unwrap();
    assert_eq!(card.rev(), rev);
}

#[test]
fn permissive_classes_keep_undeclared_keys() {
    let mut store = MemoryStore::new();
    let card = new("OpenCard", json!({"first_name": "Sam"}));
    card.assign_attributes(attrs(json!({"testing": "fooobar"}))).unwrap();
    assert_eq!(card.lookup("testing"), Value::from("fooobar"));
    card.save(&mut store).unwrap();
    let rev = card.rev();
    card.update_attributes(attrs(json!({"testing": "again"})), &mut store).unwrap();
    assert_eq!(card.lookup("testing"), Value::from("again"));
    assert_ne!(card.rev(), rev);
    assert_eq!(card.to_plain()["testing"], json!("again"));
}

#[test]
fn undeclared_keys_cannot_nest_documents_into_each_other() {
    let a = new("OpenCard", json!({"first_name": "A"}));
    let b = new("OpenCard", json!({"first_name": "B"}));
    let mut peer = attrs(json!({}));
    peer.insert("peer".into(), Value::Model(b.clone()));
    a.assign_attributes(peer).unwrap();

    let mut back = attrs(json!({"note": "kept?"}));
    back.insert("peer".into(), Value::Model(a.clone()));
    let err = b.assign_attributes(back).unwrap_err();
    assert!(matches!(err, CastError::CyclicAssignment { ref property } if property == "peer"), "{err:?}");
    assert_eq!(b.lookup("note"), Value::Null);
    assert_eq!(b.lookup("peer"), Value::Null);
    // the untyped declared slot guards the same way
    assert!(matches!(b.set("first_name", a.clone()), Err(CastError::CyclicAssignment { .. })));
    assert_eq!(a.to_plain()["peer"]["first_name"], json!("B"));
}

#[test]
fn read_only_keys_are_never_shadowed_into_the_schemaless_slot() {
    let card = new("OpenCard", json!({"first_name": "Sam", "read_only_value": "x"}));
    assert_eq!(card.lookup("read_only_value"), Value::Null);
    assert!(card.attribute_store().schemaless("read_only_value").is_none());
}

#[test]
fn protected_properties_are_skipped_by_mass_assignment() {
    let mut store = MemoryStore::new();
    let cat = new(
        "Cat",
        json!({"name": "Helena", "toys": [{"name": "Zorro"}], "favorite_toy": {"name": "Zorro"}, "number": 1}),
    );
    assert!(cat.save(&mut store).unwrap());
    assert_eq!(text(&cat, "number"), Value::Null);
    cat.set("number", 1).unwrap();
    cat.save(&mut store).unwrap();
    assert_eq!(text(&cat, "number"), Value::Integer(1));
}

// ---- Validation ---- //

#[test]
fn presence_validation() {
    let card = card();
    assert!(card.valid());
    card.set("first_name", Value::Null).unwrap();
    assert!(!card.valid());
    assert_eq!(card.errors().on("first_name"), ["can't be blank".to_string()]);
}

#[test]
fn presence_of_two_attributes_after_clear() {
    let invoice = new("Invoice", json!({"client_name": "matt", "employee_name": "Chris", "location": "San Diego, CA"}));
    invoice.clear();
    assert!(!invoice.valid());
    assert_eq!(invoice.errors().on("client_name"), ["can't be blank".to_string()]);
    assert!(!invoice.errors().on("employee_name").is_empty());
}

#[test]
fn custom_presence_message_and_no_save_when_invalid() {
    let mut store = MemoryStore::new();
    let invoice = new("Invoice", json!({"client_name": "matt", "employee_name": "Chris", "location": "San Diego, CA"}));
    invoice.set("location", Value::Null).unwrap();
    assert!(!invoice.valid());
    assert_eq!(invoice.errors().on("location"), ["Hey stupid!, you forgot the location".to_string()]);
    assert!(!invoice.save(&mut store).unwrap());
    assert!(invoice.is_new());
}

// ---- Hash and array properties ---- //

#[test]
fn hash_property_round_trips_through_its_own_getter() {
    let chain = new("KeyChain", json!({}));
    let keys = Value::from_json(&json!({"House": "8==$", "Office": "<>==U"}));
    chain.set("keys", keys.clone()).unwrap();
    chain.set("keys", text(&chain, "keys")).unwrap();
    assert_eq!(text(&chain, "keys"), keys);
}

#[test]
fn array_of_models_from_objects_and_hashes() {
    let course = new("Course", json!({"title": "Test Course"}));
    let q1 = new("Question", json!({"q": "works?"}));
    let q2 = new("Question", json!({"q": "Meaning of Life?"}));
    course.set("questions", vec![Value::from(q1.clone()), Value::from(q2)]).unwrap();
    let questions = text(&course, "questions");
    assert_eq!(questions.as_collection().unwrap().len(), 2);
    assert_eq!(questions.as_collection().unwrap().first(), Some(Value::from(q1)));

    course.set("questions", Value::from_json(&json!([{"q": "works?"}, {"q": "Meaning of Life?"}]))).unwrap();
    let last = text(&course, "questions").as_collection().unwrap().last().unwrap();
    assert_eq!(last.as_model().unwrap().class_name(), "Question");
    assert_eq!(last.as_model().unwrap().get("q").unwrap(), Value::from("Meaning of Life?"));
}

#[test]
fn keyed_hashes_are_ordered_numerically() {
    let course = new("Course", json!({"title": "Test Course"}));
    course
        .set("questions", Value::from_json(&json!({"10": {"q": "Test10"}, "0": {"q": "Test1"}, "1": {"q": "Test2"}})))
        .unwrap();
    let questions = text(&course, "questions");
    let questions = questions.as_collection().unwrap();
    assert_eq!(questions.len(), 3);
    let qs: Vec<_> = questions.to_vec().iter().map(|q| q.as_model().unwrap().get("q").unwrap()).collect();
    assert_eq!(qs, vec![Value::from("Test1"), Value::from("Test2"), Value::from("Test10")]);

    let mut keyed = indexmap::IndexMap::new();
    keyed.insert("1".to_string(), Value::from(new("Question", json!({"q": "Test2"}))));
    keyed.insert("0".to_string(), Value::from(new("Question", json!({"q": "Test1"}))));
    course.set("questions", Value::Map(keyed)).unwrap();
    let last = text(&course, "questions").as_collection().unwrap().last().unwrap();
    assert_eq!(last.as_model().unwrap().get("q").unwrap(), Value::from("Test2"));
}

#[test]
fn single_value_for_array_type_fails() {
    let course = new("Course", json!({"title": "Test Course"}));
    let err = course.set("questions", new("Question", json!({"q": "test1"}))).unwrap_err();
    assert!(err.to_string().contains("Expecting an array"), "{err}");
}

#[test]
fn scalar_properties_are_cast_leniently() {
    let course = new(
        "Course",
        json!({
            "title": "Science",
            "ends_at": "2011-04-01T18:50:32+02:00",
            "estimate": "3.5",
            "hours": "12",
            "started_on": "2011-04-01",
            "active": "true",
            "tags": ["a", 1, true]
        }),
    );
    let ends_at = text(&course, "ends_at").as_time().unwrap();
    assert_eq!(ends_at.hour(), 18);
    assert_eq!(ends_at.offset().local_minus_utc(), 7200);
    assert_eq!(text(&course, "estimate"), Value::Float(3.5));
    assert_eq!(text(&course, "hours"), Value::Integer(12));
    assert_eq!(text(&course, "started_on"), Value::Date(NaiveDate::from_ymd_opt(2011, 4, 1).unwrap()));
    assert_eq!(text(&course, "active"), Value::Bool(true));
    assert_eq!(text(&course, "tags"), strings(&["a", "1", "true"]));
    assert_eq!(course.to_plain()["ends_at"], json!("2011-04-01T18:50:32.000+02:00"));
}

#[test]
fn already_typed_values_are_reused() {
    let course = new("Course", json!({}));
    let d = NaiveDate::from_ymd_opt(2011, 4, 1).unwrap();
    course.set("started_on", d).unwrap();
    assert_eq!(text(&course, "started_on"), Value::Date(d));
    let professor = new("Person", json!({"name": ["Plum"]}));
    course.set("professor", professor.clone()).unwrap();
    assert!(get_model(&course, "professor").ptr_eq(&professor));
}

#[test]
fn casted_models_loaded_from_a_store_know_their_parent() {
    let mut store = MemoryStore::new();
    let cat = new("Cat", json!({"name": "Felix", "favorite_toy": {"name": "Ball"}, "toys": [{"name": "Mouse"}]}));
    cat.save(&mut store).unwrap();
    let loaded = SCHEMA.class("Cat").unwrap().find(&store, &cat.id().unwrap()).unwrap();
    assert!(get_model(&loaded, "favorite_toy").casted_by().unwrap().ptr_eq(&loaded));
    let first = text(&loaded, "toys").as_collection().unwrap().first().unwrap();
    assert!(first.as_model().unwrap().casted_by().unwrap().ptr_eq(&loaded));
}

// ---- Descriptors ---- //

#[test]
fn descriptor_shape() {
    let p = PropertyDescriptor::new("type", PropertyType::Scalar(TypeClass::String));
    assert_eq!(p.to_string(), "type");
    assert_eq!(p.type_class().map(|c| c.name()), Some("String"));
    assert!(!p.is_array());

    let p = PropertyBuilder::new("dates").array_of(TypeClass::Date).build();
    assert!(p.is_array());
    assert_eq!(p.type_class().map(|c| c.name()), Some("Date"));

    let p = PropertyDescriptor::new("anything", PropertyType::Untyped);
    assert!(p.type_class().is_none());
    assert!(!p.is_casted());

    let p = PropertyBuilder::new("time").scalar(TypeClass::Time).init_method("parse").build();
    assert_eq!(p.init_method(), "parse");
    let p = PropertyBuilder::new("time").scalar(TypeClass::Time).build();
    assert_eq!(p.init_method(), "new");
}

#[test]
fn build_uses_the_construction_method() {
    let p = PropertyBuilder::new("time").scalar(TypeClass::Time).init_method("parse").build();
    let built = p.construct(vec!["2011-04-01T18:50:32Z".into()]).unwrap();
    assert!(built.as_time().is_some());

    let p = PropertyBuilder::new("name")
        .scalar(TypeClass::String)
        .init_with(|args| Ok(Value::from(format!("built {}", args.len()))))
        .build();
    assert_eq!(p.construct(vec![Value::Null, Value::Null]).unwrap(), Value::from("built 2"));

    let p = PropertyDescriptor::new("untyped", PropertyType::Untyped);
    assert!(matches!(p.construct(vec![]), Err(CastError::Build { .. })));
}

#[test]
fn cast_sets_casted_by_on_new_values() {
    let course = new("Course", json!({}));
    let professor = course.properties().into_iter().find(|p| p.name() == "professor").unwrap();
    let out = professor.cast(&course, Value::from_json(&json!({"name": ["Plum"]}))).unwrap();
    let person = out.as_model().unwrap();
    assert!(person.casted_by().unwrap().ptr_eq(&course));
    assert!(Arc::ptr_eq(&person.casted_by_property().unwrap(), &professor));

    let participants = course.properties().into_iter().find(|p| p.name() == "participants").unwrap();
    let out = participants.cast(&course, Value::from_json(&json!([{"a": 1}, "b"]))).unwrap();
    assert!(out.as_collection().unwrap().casted_by().unwrap().ptr_eq(&course));
}
