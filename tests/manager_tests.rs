use entitystore::{
    Entity, EntityError, FieldType, Manager, MemoryStore, Persistable, Schema,
};
use serde_json::json;
use std::sync::Arc;

async fn setup() -> Manager {
    let manager = Manager::new(Arc::new(MemoryStore::new()));

    let mut schema = Schema::new(manager.clone());
    schema.set_machine_name("item");
    schema.set_title("Item");
    schema.set_description("A catalogue item.");
    schema
        .add_field("label", "Label", "The item label.", FieldType::String, None)
        .unwrap();
    schema.save(None).await.unwrap();

    manager
}

async fn saved_item(manager: &Manager, name: &str, label: &str) -> Entity {
    let mut item = manager.create("item", None).await.unwrap();
    item.set_machine_name(name);
    item.set("label", json!(label)).await.unwrap();
    item.save(None).await.unwrap();
    item
}

#[tokio::test]
async fn missing_schemas_propagate_not_found() {
    let manager = setup().await;

    let err = manager.schema("ghost").await.unwrap_err();
    assert!(matches!(
        err,
        EntityError::CantFindEntity { collection, machine_name }
            if collection == "schemas" && machine_name == "ghost"
    ));

    // every schema-resolving operation reports the same failure
    assert!(manager.count("ghost").await.is_err());
    assert!(manager.exists("ghost", "x").await.is_err());
    assert!(manager.create("ghost", None).await.is_err());
    assert!(manager.load("ghost", "x", false).await.is_err());
}

#[tokio::test]
async fn exists_and_count_see_saved_entities() {
    let manager = setup().await;
    assert_eq!(manager.count("item").await.unwrap(), 0);
    assert!(!manager.exists("item", "item-a").await.unwrap());

    saved_item(&manager, "item-a", "A").await;
    saved_item(&manager, "item-b", "B").await;

    assert_eq!(manager.count("item").await.unwrap(), 2);
    assert!(manager.exists("item", "item-a").await.unwrap());
    assert!(!manager.exists("item", "item-z").await.unwrap());
}

#[tokio::test]
async fn load_force_turns_not_found_into_none() {
    let manager = setup().await;

    let err = manager.load("item", "absent", false).await.unwrap_err();
    assert!(matches!(err, EntityError::CantFindEntity { .. }));

    let found = manager.load("item", "absent", true).await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn find_paginates_in_sort_order() {
    let manager = setup().await;
    for name in ["item-a", "item-b", "item-c", "item-d"] {
        saved_item(&manager, name, name).await;
    }

    let page = manager
        .find(
            "item",
            json!({"filter": {}, "orderBy": {"machineName": 1}}),
            2,
            2,
        )
        .await
        .unwrap();

    assert_eq!(page.total, 4);
    assert_eq!(page.page, 2);
    assert_eq!(page.per_page, 2);
    assert_eq!(page.page_count, 2);
    let names: Vec<_> = page.entities.iter().map(|e| e.machine_name()).collect();
    assert_eq!(names, vec!["item-c", "item-d"]);
}

#[tokio::test]
async fn find_with_per_page_zero_returns_everything() {
    let manager = setup().await;
    for name in ["item-a", "item-b", "item-c", "item-d"] {
        saved_item(&manager, name, name).await;
    }

    let page = manager.find("item", json!({}), 0, 1).await.unwrap();
    assert_eq!(page.entities.len(), 4);
    assert_eq!(page.total, 4);
    assert_eq!(page.page_count, 1);
}

#[tokio::test]
async fn find_honours_filters_and_descending_order() {
    let manager = setup().await;
    for name in ["item-a", "item-b", "item-c"] {
        saved_item(&manager, name, name).await;
    }

    let one = manager
        .find("item", json!({"machineName": "item-b"}), 25, 1)
        .await
        .unwrap();
    assert_eq!(one.total, 1);
    assert_eq!(one.entities[0].machine_name(), "item-b");

    let descending = manager
        .find("item", json!({"filter": {}, "orderBy": {"machineName": -1}}), 25, 1)
        .await
        .unwrap();
    let names: Vec<_> = descending.entities.iter().map(|e| e.machine_name()).collect();
    assert_eq!(names, vec!["item-c", "item-b", "item-a"]);
}

#[tokio::test]
async fn find_results_carry_field_data() {
    let manager = setup().await;
    saved_item(&manager, "item-a", "The label").await;

    let page = manager.find("item", json!({}), 25, 1).await.unwrap();
    assert_eq!(page.entities.len(), 1);
    assert_eq!(
        page.entities[0].get("label").unwrap().as_value(),
        Some(&json!("The label"))
    );
    assert!(!page.entities[0].is_new());
}

#[tokio::test]
async fn an_empty_find_is_an_empty_page() {
    let manager = setup().await;

    let page = manager.find("item", json!({}), 25, 1).await.unwrap();
    assert!(page.entities.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.page_count, 0);
}

#[tokio::test]
async fn schemas_lists_registered_summaries() {
    let manager = setup().await;

    let mut extra = Schema::new(manager.clone());
    extra.set_machine_name("extra");
    extra.set_title("Extra");
    extra.save(None).await.unwrap();

    let mut infos = manager.schemas().await.unwrap();
    infos.sort_by(|a, b| a.machine_name.cmp(&b.machine_name));

    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].machine_name, "extra");
    assert_eq!(infos[0].title, "Extra");
    assert_eq!(infos[1].machine_name, "item");
    assert_eq!(infos[1].description, "A catalogue item.");
}

#[tokio::test]
async fn the_trash_is_shared_across_entity_kinds() {
    let manager = setup().await;

    let mut other_schema = Schema::new(manager.clone());
    other_schema.set_machine_name("other");
    other_schema
        .add_field("label", "Label", "", FieldType::String, None)
        .unwrap();
    other_schema.save(None).await.unwrap();

    let mut item = saved_item(&manager, "shared-name", "Item").await;
    let mut other = manager.create("other", None).await.unwrap();
    other.set_machine_name("shared-name");
    other.save(None).await.unwrap();

    item.delete(None, false).await.unwrap();
    other.delete(None, false).await.unwrap();
    assert_eq!(
        manager
            .trash_collection()
            .count(&entitystore::Document::new())
            .await
            .unwrap(),
        2
    );

    // each kind finds its own envelope
    let item_back = manager.load("item", "shared-name", false).await.unwrap().unwrap();
    assert!(item_back.is_trashed());
    assert_eq!(item_back.entity_type(), "item");
    let other_back = manager.load("other", "shared-name", false).await.unwrap().unwrap();
    assert!(other_back.is_trashed());
    assert_eq!(other_back.entity_type(), "other");
}
