// Copyright 2025 Cowboy AI, LLC.

//! Deep loading along dotted paths

use cim_odm::{
    BoundModel, InMemoryAdapter, Model, ModelDef, Query, QueryOptions, Repository, Schema,
    SchemaEntry, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

struct Shop {
    owners: BoundModel,
    items: BoundModel,
    carts: BoundModel,
}

fn shop() -> Shop {
    let repository = Repository::new(InMemoryAdapter::new());
    let owners = repository
        .add_model(ModelDef::new("Owner", Schema::new().field("name", "string")).unwrap())
        .unwrap();
    let items = repository
        .add_model(
            ModelDef::new(
                "Item",
                Schema::new()
                    .field("label", "string")
                    .field("owner", SchemaEntry::reference("Owner")),
            )
            .unwrap(),
        )
        .unwrap();
    let carts = repository
        .add_model(
            ModelDef::new(
                "Cart",
                Schema::new()
                    .field("title", "string")
                    .field("items", SchemaEntry::list(SchemaEntry::reference("Item"))),
            )
            .unwrap(),
        )
        .unwrap();
    Shop {
        owners,
        items,
        carts,
    }
}

async fn filled_cart(shop: &Shop) -> Model {
    let mut items = Vec::new();
    for (label, owner) in [("lamp", "Ann"), ("desk", "Bo"), ("rug", "Cy")] {
        let owner = shop.owners.create(&json!({ "name": owner })).await.unwrap();
        let item = shop
            .items
            .create_from([("label", Value::from(label)), ("owner", Value::from(owner))])
            .await
            .unwrap();
        items.push(item);
    }
    shop.carts
        .create_from([("title", Value::from("home")), ("items", Value::from(items))])
        .await
        .unwrap()
}

fn elements(cart: &Model) -> &[Value] {
    cart.get("items").unwrap().as_list().unwrap()
}

#[tokio::test]
async fn test_wildcard_loads_every_element_and_its_target() {
    let shop = shop();
    let cart = filled_cart(&shop).await;

    let mut fetched = shop.carts.get_by_id(cart.id()).await.unwrap();
    assert!(elements(&fetched)
        .iter()
        .all(|item| !item.as_model().unwrap().loaded()));

    fetched.load_paths(&["items[*].owner"]).await.unwrap();
    let owners: Vec<_> = elements(&fetched)
        .iter()
        .map(|item| {
            let item = item.as_model().unwrap();
            assert!(item.loaded());
            let owner = item.get("owner").unwrap().as_model().unwrap();
            assert!(owner.loaded());
            owner.get("name").unwrap().as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(owners, vec!["Ann", "Bo", "Cy"]);
    assert_eq!(
        fetched.get_path("items.1.label").unwrap().as_str(),
        Some("desk")
    );
}

#[tokio::test]
async fn test_find_deep_loads_every_result() {
    let shop = shop();
    filled_cart(&shop).await;
    filled_cart(&shop).await;

    let carts = shop
        .carts
        .find_with(&Query::all(), &QueryOptions::loading(["items[*]"]))
        .await
        .unwrap();
    assert_eq!(carts.len(), 2);
    for cart in &carts {
        assert!(cart.loaded());
        for item in elements(cart) {
            let item = item.as_model().unwrap();
            assert!(item.loaded());
            assert!(!item.get("owner").unwrap().as_model().unwrap().loaded());
        }
    }
}

#[tokio::test]
async fn test_bad_paths_are_path_errors() {
    let shop = shop();
    let cart = filled_cart(&shop).await;
    let mut fetched = shop.carts.get_by_id(cart.id()).await.unwrap();

    for path in ["nope", "items.owner", "title[*]", "title.length", "items[*].owner.ghost"] {
        let err = fetched.load_paths(&[path]).await.unwrap_err();
        assert!(err.is_path_error(), "{path} gave {err:?}");
    }
}

#[tokio::test]
async fn test_load_all_hydrates_stubs() {
    let shop = shop();
    let cart = filled_cart(&shop).await;
    let fetched = shop.carts.get_by_id(cart.id()).await.unwrap();

    let mut items: Vec<Model> = elements(&fetched)
        .iter()
        .map(|item| item.as_model().unwrap().clone())
        .collect();
    shop.items.load_all(&mut items, &["owner"]).await.unwrap();

    assert!(items.iter().all(Model::loaded));
    assert_eq!(items[2].get_path("owner.name").unwrap().as_str(), Some("Cy"));
}

#[tokio::test]
async fn test_references_can_be_queried_by_identity() {
    let shop = shop();
    let owner = shop.owners.create(&json!({"name": "Dee"})).await.unwrap();
    shop.items
        .create_from([("label", Value::from("vase")), ("owner", Value::from(owner.clone()))])
        .await
        .unwrap();
    filled_cart(&shop).await;

    let owned = shop
        .items
        .find(&Query::all().with_ref("owner", &owner))
        .await
        .unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].get("label").unwrap().as_str(), Some("vase"));
}
