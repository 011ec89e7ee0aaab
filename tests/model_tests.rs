// Copyright 2025 Cowboy AI, LLC.

//! Model construction, coercion and serialization through the public API

use cim_odm::{
    FieldDef, InMemoryAdapter, Model, ModelDef, OdmError, Repository, Schema, SchemaEntry, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn person_def() -> Arc<ModelDef> {
    ModelDef::new(
        "Person",
        Schema::new()
            .field("name", "string")
            .field("age", "integer")
            .field("height", "number")
            .field("born", "Date")
            .field("tags", SchemaEntry::list("string"))
            .field(
                "address",
                Schema::new().field("city", "string").field("zip", "string"),
            )
            .field("notes", "Mixed"),
    )
    .unwrap()
}

#[test]
fn test_round_trip_preserves_field_values() {
    let def = person_def();
    let original = def
        .instance(&json!({
            "name": "Ann",
            "age": 41,
            "height": 1.72,
            "born": "1983-04-05",
            "tags": ["admin", "ops"],
            "address": {"city": "Austin", "zip": "78701"},
            "notes": {"free": ["form"]}
        }))
        .unwrap();

    let copy = Model::from_json(def.clone(), &original.to_json(), None).unwrap();
    assert_eq!(copy, original);
    assert_eq!(copy.id(), original.id());
    assert_eq!(copy.get_path("address.city").unwrap().as_str(), Some("Austin"));
    assert_eq!(
        copy.to_json()["born"],
        json!("1983-04-05T00:00:00.000Z")
    );
}

#[test]
fn test_round_trip_through_the_registry_discriminator() {
    let repository = Repository::new(InMemoryAdapter::new());
    let people = repository.add_model(person_def()).unwrap();
    let original = people.instance(&json!({"name": "Cy", "age": 7})).unwrap();

    let copy = repository.from_json(&original.to_json(), None).unwrap();
    assert_eq!(copy.model_name(), "Person");
    assert_eq!(copy.to_json(), original.to_json());
}

#[test]
fn test_values_are_cast_to_their_declared_types() {
    let def = person_def();
    let person = def
        .instance(&json!({"name": 42, "age": "42", "height": "1.5", "tags": ["a", 1]}))
        .unwrap();

    assert_eq!(person.get("name").unwrap(), &Value::from("42"));
    assert_eq!(person.get("age").unwrap(), &Value::Integer(42));
    assert_eq!(person.get("height").unwrap(), &Value::Number(1.5));
    assert_eq!(
        person.get("tags").unwrap(),
        &Value::from(vec!["a", "1"])
    );

    let err = def.instance(&json!({"age": "forty"})).unwrap_err();
    assert!(err.is_validation_error());
    let err = def.instance(&json!({"tags": "solo"})).unwrap_err();
    assert!(matches!(err, OdmError::InvalidValue { field, .. } if field == "tags"));
}

#[test]
fn test_defaults_apply_only_to_null() {
    let def = ModelDef::new(
        "Post",
        Schema::new()
            .field("status", FieldDef::new("string").default_value("draft"))
            .field("views", FieldDef::new("integer").required())
            .field("pinned", FieldDef::new("boolean").default_value(true)),
    )
    .unwrap();

    let blank = def.instance(&json!({})).unwrap();
    assert_eq!(blank.get("status").unwrap().as_str(), Some("draft"));
    assert_eq!(blank.get("views").unwrap().as_i64(), Some(0));
    assert_eq!(blank.get("pinned").unwrap().as_bool(), Some(true));

    let explicit = def
        .instance(&json!({"status": "", "views": 3, "pinned": false}))
        .unwrap();
    assert_eq!(explicit.get("status").unwrap().as_str(), Some(""));
    assert_eq!(explicit.get("pinned").unwrap().as_bool(), Some(false));

    let other = def.instance(&json!({})).unwrap();
    assert_ne!(other.id(), blank.id());
    assert_eq!(other.get("status").unwrap(), blank.get("status").unwrap());
}

#[test]
fn test_validator_rejects_without_poisoning_the_field() {
    let def = ModelDef::new(
        "Account",
        Schema::new().field(
            "balance",
            FieldDef::new("integer").validator(|value| match value.as_i64() {
                Some(n) if n >= 0 => Ok(()),
                _ => Err("balance must not be negative".to_string()),
            }),
        ),
    )
    .unwrap();

    assert_eq!(
        def.instance(&json!({"balance": -1})).unwrap_err(),
        OdmError::Validation {
            field: "balance".to_string(),
            message: "balance must not be negative".to_string(),
        }
    );

    let mut account = def.instance(&json!({"balance": 10})).unwrap();
    assert!(account.set("balance", -5).unwrap_err().is_validation_error());
    assert_eq!(account.get("balance").unwrap().as_i64(), Some(10));

    account.set("balance", 3).unwrap();
    assert_eq!(account.get("balance").unwrap().as_i64(), Some(3));
    account.validate().unwrap();
}

#[test]
fn test_readonly_fields_accept_construction_only() {
    let def = ModelDef::new(
        "Invoice",
        Schema::new().field("number", FieldDef::new("string").readonly()),
    )
    .unwrap();

    let mut invoice = def.instance(&json!({"number": "INV-1"})).unwrap();
    assert_eq!(
        invoice.set("number", "INV-2").unwrap_err(),
        OdmError::ReadonlyField {
            field: "number".to_string()
        }
    );
    assert_eq!(invoice.get("number").unwrap().as_str(), Some("INV-1"));
}

#[test]
fn test_invalid_schemas_fail_at_definition() {
    let err = ModelDef::new("Bad", Schema::new().field("x", "strnig")).unwrap_err();
    assert!(matches!(err, OdmError::InvalidType { ref type_name, .. } if type_name == "strnig"));
    assert!(err.is_schema_error());

    let err = ModelDef::new(
        "Bad",
        Schema::new().field(
            "x",
            SchemaEntry::List(vec!["string".into(), "number".into()]),
        ),
    )
    .unwrap_err();
    assert!(matches!(err, OdmError::AmbiguousList { .. }));

    let err = ModelDef::new("Bad", Schema::new().field("x", SchemaEntry::reference("string")))
        .unwrap_err();
    assert!(matches!(err, OdmError::InvalidReference { .. }));
}

#[test]
fn test_nested_models_serialize_inline() {
    let address = ModelDef::new("Address", Schema::new().field("city", "string")).unwrap();
    let shop = ModelDef::new(
        "Shop",
        Schema::new()
            .field("name", "string")
            .field("location", SchemaEntry::Model((&address).into())),
    )
    .unwrap();

    let instance = shop
        .instance(&json!({"name": "Corner", "location": {"city": "Lyon"}}))
        .unwrap();
    let rendered = instance.to_json();
    assert_eq!(rendered["location"]["$type"], json!("Address"));
    assert_eq!(rendered["location"]["city"], json!("Lyon"));
    assert_eq!(
        instance.get_path("location.city").unwrap().as_str(),
        Some("Lyon")
    );
}

#[test]
fn test_set_path_writes_into_embedded_objects() {
    let def = person_def();
    let mut person = def.instance(&json!({"name": "Ann"})).unwrap();

    person.set_path("address.city", "Oslo").unwrap();
    assert_eq!(person.to_json()["address"], json!({"city": "Oslo"}));
    assert!(person.set_path("address.planet", "Mars").unwrap_err().is_path_error());
}
