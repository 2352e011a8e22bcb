#![allow(dead_code)]

use json_cast::class::ModelClassBuilder;
use json_cast::model::Model;
use json_cast::property::{PropertyBuilder, TypeClass};
use json_cast::schema::{Schema, SchemaBuilder};
use json_cast::validation::Rule;
use json_cast::value::{attrs, Value};
use once_cell::sync::Lazy;
use serde_json::json;

/// Shared fixture classes. Lives for the whole test binary so class links
/// stay bound.
pub static SCHEMA: Lazy<Schema> = Lazy::new(|| build().expect("fixture schema is valid"));

pub fn new(class: &str, json: serde_json::Value) -> Model {
    SCHEMA
        .class(class)
        .unwrap_or_else(|| panic!("no fixture class {class}"))
        .new_instance(attrs(json))
        .unwrap()
}

pub fn get_model(model: &Model, name: &str) -> Model {
    model.get(name).unwrap().as_model().cloned().unwrap()
}

pub fn text(model: &Model, name: &str) -> Value {
    model.get(name).unwrap()
}

fn build() -> Result<Schema, json_cast::SchemaError> {
    SchemaBuilder::new()
        .class(
            ModelClassBuilder::document("Card")
                .property(PropertyBuilder::new("first_name"))?
                .property(PropertyBuilder::new("last_name").alias("family_name"))?
                .property(PropertyBuilder::new("read_only_value").read_only(true))?
                .property(PropertyBuilder::new("cast_alias").model("Person").alias("calias"))?
                .validates_presence_of("first_name"),
        )?
        .class(
            ModelClassBuilder::document("OpenCard")
                .mass_assign_any_attribute(true)
                .property(PropertyBuilder::new("first_name"))?
                .property(PropertyBuilder::new("read_only_value").read_only(true))?,
        )?
        .class(
            ModelClassBuilder::document("Cat")
                .property(PropertyBuilder::new("name"))?
                .property(PropertyBuilder::new("toys").array_of_models("CatToy"))?
                .property(PropertyBuilder::new("favorite_toy").model("CatToy"))?
                .property(PropertyBuilder::new("number").protected(true))?
                .validates_presence_of("name"),
        )?
        .class(
            ModelClassBuilder::embeddable("CatToy")
                .property(PropertyBuilder::new("name"))?
                .validates_presence_of("name"),
        )?
        .class(
            ModelClassBuilder::document("Course")
                .property(PropertyBuilder::new("title"))?
                .property(PropertyBuilder::new("questions").array_of_models("Question"))?
                .property(PropertyBuilder::new("professor").model("Person"))?
                .property(PropertyBuilder::new("participants").array_of(TypeClass::Object))?
                .property(PropertyBuilder::new("ends_at").scalar(TypeClass::Time))?
                .property(PropertyBuilder::new("estimate").scalar(TypeClass::Float))?
                .property(PropertyBuilder::new("hours").scalar(TypeClass::Integer))?
                .property(PropertyBuilder::new("started_on").scalar(TypeClass::Date))?
                .property(PropertyBuilder::new("active").scalar(TypeClass::Boolean))?
                .property(PropertyBuilder::new("tags").array_of(TypeClass::String))?,
        )?
        .class(
            ModelClassBuilder::embeddable("Question")
                .property(PropertyBuilder::new("q"))?
                .property(PropertyBuilder::new("a"))?,
        )?
        .class(
            ModelClassBuilder::embeddable("Person")
                .property(PropertyBuilder::new("pet").model("Cat"))?
                .property(PropertyBuilder::new("name").array_of(TypeClass::String))?,
        )?
        .class(
            ModelClassBuilder::document("KeyChain")
                .property(PropertyBuilder::new("keys").scalar(TypeClass::Hash).default_json(json!({})))?,
        )?
        .class(
            ModelClassBuilder::document("Invoice")
                .property(PropertyBuilder::new("client_name"))?
                .property(PropertyBuilder::new("employee_name"))?
                .property(PropertyBuilder::new("location"))?
                .validates_presence_of("client_name")
                .validates_presence_of("employee_name")
                .rule(Rule::Presence {
                    property: "location".to_string(),
                    message: Some("Hey stupid!, you forgot the location".to_string()),
                }),
        )?
        .class(
            ModelClassBuilder::embeddable("WithCastedModelMixin")
                .property(PropertyBuilder::new("name"))?
                .property(PropertyBuilder::new("no_value"))?
                .property(PropertyBuilder::new("details").scalar(TypeClass::Object).default_json(json!({})))?
                .property(PropertyBuilder::new("casted_attribute").model("WithCastedModelMixin"))?,
        )?
        .class(
            ModelClassBuilder::document("DummyModel")
                .property(PropertyBuilder::new("casted_attribute").model("WithCastedModelMixin"))?
                .property(PropertyBuilder::new("keywords").array_of(TypeClass::String))?
                .nested("sub_models", true, |c| c.property(PropertyBuilder::new("title")))?
                .nested("param_free_sub_models", true, |c| c.property(PropertyBuilder::new("title")))?,
        )?
        .class(
            ModelClassBuilder::embeddable("WithCastedCallBackModel")
                .property(PropertyBuilder::new("name"))?
                .property(PropertyBuilder::new("run_before_validation"))?
                .property(PropertyBuilder::new("run_after_validation"))?
                .validates_presence_of("run_before_validation")
                .before_validation(|m| {
                    let _ = m.set("run_before_validation", true);
                })
                .after_validation(|m| {
                    let _ = m.set("run_after_validation", true);
                }),
        )?
        .class(
            ModelClassBuilder::embeddable("SelfNaming")
                .property(PropertyBuilder::new("name"))?
                .after_initialize(|m| {
                    let _ = m.set("name", "foobar");
                }),
        )?
        .class(
            ModelClassBuilder::document("CastedCallbackDoc")
                .property(PropertyBuilder::new("callback_model").model("WithCastedCallBackModel"))?,
        )?
        .build()
}
