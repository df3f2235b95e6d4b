use async_trait::async_trait;
use entitystore::{
    EntityError, FieldOptions, FieldType, FieldValue, Manager, MemoryStore, Persistable,
    RuleContext, SanitizeRule, Schema, ValidateRule,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn manager() -> Manager {
    Manager::new(Arc::new(MemoryStore::new()))
}

fn options(value: Value) -> Option<FieldOptions> {
    value.as_object().cloned()
}

#[tokio::test]
async fn add_field_rejects_a_second_definition() {
    let mut schema = Schema::new(manager());
    schema
        .add_field("title", "Title", "First definition.", FieldType::String, None)
        .unwrap();

    let err = schema
        .add_field("title", "Other", "Second definition.", FieldType::Number, None)
        .unwrap_err();
    assert!(matches!(err, EntityError::SchemaFieldDefined(name) if name == "title"));

    // the first definition is unchanged
    let field = schema.field("title").unwrap();
    assert_eq!(field.title, "Title");
    assert_eq!(field.description, "First definition.");
    assert_eq!(field.field_type, FieldType::String);
}

#[tokio::test]
async fn unknown_fields_error_on_lookup_and_removal() {
    let mut schema = Schema::new(manager());

    assert!(matches!(
        schema.field("ghost").unwrap_err(),
        EntityError::UnknownSchemaField(name) if name == "ghost"
    ));
    assert!(matches!(
        schema.del_field("ghost").unwrap_err(),
        EntityError::UnknownSchemaField(_)
    ));
    assert!(matches!(
        schema.add_field_sanitization("ghost", "trim", None, 0).unwrap_err(),
        EntityError::UnknownSchemaField(_)
    ));
    assert!(matches!(
        schema.add_field_validation("ghost", "machine-name", None, 0).unwrap_err(),
        EntityError::UnknownSchemaField(_)
    ));
}

#[tokio::test]
async fn del_field_removes_the_definition() {
    let mut schema = Schema::new(manager());
    schema
        .add_field("title", "Title", "", FieldType::String, None)
        .unwrap();
    assert!(schema.has_field("title"));

    schema.del_field("title").unwrap();
    assert!(!schema.has_field("title"));
    assert!(schema.lifecycle().is_updated());
}

#[tokio::test]
async fn unknown_rules_are_rejected_at_definition_time() {
    let mut schema = Schema::new(manager());
    schema
        .add_field("title", "Title", "", FieldType::String, None)
        .unwrap();

    assert!(matches!(
        schema.add_field_sanitization("title", "nope", None, 0).unwrap_err(),
        EntityError::UnknownSanitizer(name) if name == "nope"
    ));
    assert!(matches!(
        schema.add_field_validation("title", "nope", None, 0).unwrap_err(),
        EntityError::UnknownValidator(name) if name == "nope"
    ));
}

struct Tag(&'static str);

#[async_trait]
impl SanitizeRule for Tag {
    async fn apply(
        &self,
        _ctx: &RuleContext,
        value: FieldValue,
        _options: &Value,
    ) -> entitystore::Result<FieldValue> {
        match value {
            FieldValue::Value(Value::String(s)) => {
                Ok(FieldValue::Value(Value::String(format!("{s}{}", self.0))))
            }
            other => Ok(other),
        }
    }
}

#[tokio::test]
async fn sanitizer_chains_run_in_weight_order() {
    let manager = manager();
    manager.sanitizers().register("tag-a", Arc::new(Tag("a")));
    manager.sanitizers().register("tag-b", Arc::new(Tag("b")));
    manager.sanitizers().register("tag-c", Arc::new(Tag("c")));

    let mut schema = Schema::new(manager.clone());
    schema
        .add_field("title", "Title", "", FieldType::String, None)
        .unwrap();
    schema.add_field_sanitization("title", "tag-a", None, 10).unwrap();
    schema.add_field_sanitization("title", "tag-b", None, -1).unwrap();
    // same weight as tag-a, added later, so it runs after it
    schema.add_field_sanitization("title", "tag-c", None, 10).unwrap();

    let out = schema
        .sanitize_field("title", FieldValue::from("x"))
        .await
        .unwrap();
    assert_eq!(out.value.as_value(), Some(&json!("xbac")));
    assert_eq!(out.original.as_value(), Some(&json!("x")));
}

struct Counting(Arc<AtomicUsize>);

#[async_trait]
impl ValidateRule for Counting {
    async fn check(
        &self,
        _ctx: &RuleContext,
        _value: &FieldValue,
        _options: &Value,
    ) -> entitystore::Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct AlwaysFail;

#[async_trait]
impl ValidateRule for AlwaysFail {
    async fn check(
        &self,
        _ctx: &RuleContext,
        _value: &FieldValue,
        _options: &Value,
    ) -> entitystore::Result<()> {
        Err(EntityError::ValidationFailed {
            rule: "always-fail".to_string(),
            reason: "always fails".to_string(),
        })
    }
}

#[tokio::test]
async fn validator_chains_stop_at_the_first_failure() {
    let manager = manager();
    let calls = Arc::new(AtomicUsize::new(0));
    manager.validators().register("counting", Arc::new(Counting(calls.clone())));
    manager.validators().register("always-fail", Arc::new(AlwaysFail));

    let mut schema = Schema::new(manager.clone());
    schema
        .add_field("title", "Title", "", FieldType::String, None)
        .unwrap();
    schema.add_field_validation("title", "always-fail", None, 0).unwrap();
    schema.add_field_validation("title", "counting", None, 5).unwrap();

    let err = schema
        .validate_field("title", &FieldValue::from("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, EntityError::ValidationFailed { rule, .. } if rule == "always-fail"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sanitize_and_validate_reject_unknown_fields() {
    let schema = Schema::new(manager());

    assert!(matches!(
        schema.sanitize_field("ghost", FieldValue::null()).await.unwrap_err(),
        EntityError::UnknownSchemaField(_)
    ));
    assert!(matches!(
        schema.validate_field("ghost", &FieldValue::null()).await.unwrap_err(),
        EntityError::UnknownSchemaField(_)
    ));
}

#[tokio::test]
async fn schema_round_trips_through_the_store() {
    let manager = manager();

    let mut schema = Schema::new(manager.clone());
    schema.set_machine_name("article");
    schema.set_title("Article");
    schema.set_description("A piece of writing.");
    schema
        .add_field(
            "title",
            "Title",
            "The article title.",
            FieldType::String,
            options(json!({"default": "", "required": true})),
        )
        .unwrap();
    schema.add_field_sanitization("title", "trim", None, 0).unwrap();
    schema
        .add_field_validation("title", "machine-name", None, 3)
        .unwrap();
    schema.save(None).await.unwrap();

    let loaded = manager.schema("article").await.unwrap().unwrap();
    assert_eq!(loaded.title(), "Article");
    assert_eq!(loaded.description(), "A piece of writing.");
    assert_eq!(loaded.field_names(), vec!["title"]);
    assert_eq!(loaded.entity_collection_name(), "entity-article");

    let field = loaded.field("title").unwrap();
    assert_eq!(field.field_type, FieldType::String);
    assert_eq!(field.options.get("required"), Some(&json!(true)));
    assert_eq!(field.sanitizers.len(), 1);
    assert_eq!(field.sanitizers[0].rule, "trim");
    assert_eq!(field.validators.len(), 1);
    assert_eq!(field.validators[0].rule, "machine-name");
    assert_eq!(field.validators[0].weight, 3);
}

#[tokio::test]
async fn field_type_parsing_rejects_unknown_names() {
    assert_eq!(FieldType::parse("title", "String").unwrap(), FieldType::String);
    assert_eq!(FieldType::parse("links", "Entities").unwrap(), FieldType::Entities);

    let err = FieldType::parse("widget", "Widget").unwrap_err();
    assert!(matches!(
        err,
        EntityError::UnknownFieldType { field, type_name }
            if field == "widget" && type_name == "Widget"
    ));
}

#[tokio::test]
async fn mutating_a_schema_marks_it_updated() {
    let manager = manager();

    let mut schema = Schema::new(manager.clone());
    schema.set_machine_name("tracked");
    schema.save(None).await.unwrap();
    assert!(!schema.lifecycle().is_updated());

    schema.set_title("Tracked");
    assert!(schema.lifecycle().is_updated());
}
