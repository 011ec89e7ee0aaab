// Copyright 2025 Cowboy AI, LLC.

//! References: shallow storage, lazy loading and polymorphic targets

use cim_odm::{
    BoundModel, InMemoryAdapter, JsonOptions, ModelDef, OdmError, RefDef, Repository, Schema,
    SchemaEntry, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn mail_models() -> (Repository, BoundModel, BoundModel) {
    let repository = Repository::new(InMemoryAdapter::new());
    let emails = repository
        .add_model(ModelDef::new("Email", Schema::new().field("address", "string")).unwrap())
        .unwrap();
    let users = repository
        .add_model(
            ModelDef::new(
                "User",
                Schema::new()
                    .field("name", "string")
                    .field("email", SchemaEntry::reference("Email")),
            )
            .unwrap(),
        )
        .unwrap();
    (repository, users, emails)
}

#[tokio::test]
async fn test_reference_stays_unloaded_until_its_path_is_loaded() {
    let (_, users, emails) = mail_models();

    let email = emails.create(&json!({"address": "x@y.com"})).await.unwrap();
    let user = users
        .create_from([("name", Value::from("Bob")), ("email", Value::from(email.clone()))])
        .await
        .unwrap();

    let mut fetched = users.get_by_id(user.id()).await.unwrap();
    let stub = fetched.get("email").unwrap().as_model().unwrap();
    assert!(!stub.loaded());
    assert_eq!(stub.id(), email.id());
    assert_eq!(stub.get("address").unwrap(), &Value::Null);

    fetched.load_paths(&["email"]).await.unwrap();
    let loaded = fetched.get("email").unwrap().as_model().unwrap();
    assert!(loaded.loaded());
    assert_eq!(
        fetched.get_path("email.address").unwrap().as_str(),
        Some("x@y.com")
    );
}

#[tokio::test]
async fn test_serialized_form_follows_the_loaded_state() {
    let (repository, users, emails) = mail_models();
    let email = emails.create(&json!({"address": "x@y.com"})).await.unwrap();
    let user = users
        .create(&json!({"name": "Bob", "email": email.to_ref_json()}))
        .await
        .unwrap();

    let mut fetched = users.get_by_id(user.id()).await.unwrap();
    let unloaded = fetched.to_json();
    assert_eq!(
        unloaded["email"],
        json!({"$ref": email.id(), "$type": "Email"})
    );
    let reread = repository.from_json(&unloaded, None).unwrap();
    assert!(!reread.get("email").unwrap().as_model().unwrap().loaded());

    fetched.load_paths(&["email"]).await.unwrap();
    let full = fetched.to_json();
    assert_eq!(full["email"]["address"], json!("x@y.com"));
    assert!(full["email"]["$cas"].is_u64());
    let reread = repository.from_json(&full, None).unwrap();
    assert!(reread.get("email").unwrap().as_model().unwrap().loaded());

    // Storage form never embeds the referenced record
    assert_eq!(
        fetched.to_json_with(&JsonOptions::shallow())["email"],
        json!({"$ref": email.id(), "$type": "Email"})
    );
}

#[tokio::test]
async fn test_primitive_values_are_refused_by_reference_fields() {
    let (_, users, _) = mail_models();
    let err = users
        .instance(&json!({"name": "Bob", "email": "x@y.com"}))
        .unwrap_err();
    assert!(matches!(err, OdmError::InvalidValue { ref field, .. } if field == "email"));
}

#[tokio::test]
async fn test_discriminated_values_must_name_the_target_model() {
    let (_, users, emails) = mail_models();
    let err = users
        .instance(&json!({"email": {"$ref": "u9", "$type": "User"}}))
        .unwrap_err();
    assert!(matches!(err, OdmError::InvalidValue { ref field, .. } if field == "email"));

    let mut user = users.instance(&json!({"name": "Bob"})).unwrap();
    let other = users.instance(&json!({"name": "Ann"})).unwrap();
    assert!(user.set("email", other).unwrap_err().is_validation_error());
    assert!(user.get("email").unwrap().is_null());

    let email = emails.reference("e1").unwrap();
    let user = users
        .instance(&json!({"email": {"$ref": email.id(), "$type": "Email"}}))
        .unwrap();
    assert_eq!(user.get_path("email.$id").unwrap().as_str(), Some("e1"));
}

#[tokio::test]
async fn test_mixed_references_resolve_by_discriminator() {
    let repository = Repository::new(InMemoryAdapter::new());
    let people = repository
        .add_model(ModelDef::new("Person", Schema::new().field("name", "string")).unwrap())
        .unwrap();
    let teams = repository
        .add_model(ModelDef::new("Team", Schema::new().field("title", "string")).unwrap())
        .unwrap();
    repository
        .add_model(ModelDef::new("Robot", Schema::new().field("serial", "string")).unwrap())
        .unwrap();
    let tasks = repository
        .add_model(
            ModelDef::new(
                "Task",
                Schema::new().field(
                    "assignee",
                    RefDef::mixed()
                        .union_name("Assignee")
                        .type_range(["Person", "Team"]),
                ),
            )
            .unwrap(),
        )
        .unwrap();

    let team = teams.create(&json!({"title": "Platform"})).await.unwrap();
    let task = tasks
        .create(&json!({"assignee": team.to_ref_json()}))
        .await
        .unwrap();

    let mut fetched = tasks.get_by_id(task.id()).await.unwrap();
    fetched.load_paths(&["assignee"]).await.unwrap();
    let assignee = fetched.get("assignee").unwrap().as_model().unwrap();
    assert_eq!(assignee.model_name(), "Team");
    assert_eq!(assignee.get("title").unwrap().as_str(), Some("Platform"));

    let person = people.create(&json!({"name": "Ann"})).await.unwrap();
    let mut task = tasks.instance(&json!({})).unwrap();
    task.set("assignee", person).unwrap();

    let err = tasks
        .instance(&json!({"assignee": {"$ref": "r1", "$type": "Robot"}}))
        .unwrap_err();
    assert!(err.is_validation_error());
    assert_eq!(
        tasks.instance(&json!({"assignee": {"$ref": "r1"}})).unwrap_err(),
        OdmError::MissingDiscriminator
    );
}
