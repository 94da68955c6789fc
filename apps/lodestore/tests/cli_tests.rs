//! Integration tests for CLI commands against real stores.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use lodestore::cli::{
    cmd_check, cmd_export_dictionary, cmd_import_dictionary, cmd_init, cmd_status, cmd_types,
    open_session, read_dictionary, suggest_mappings,
};
use lodestore::config::LodestoreConfig;
use lodestore_core::{
    BinaryField, CustomTypeHandler, FieldDescriptor, FieldKind, LodestoreError, MemberIdentifier,
    ObjRef, PrimitiveKind, Session, TypeDefinition, TypeDictionary, TypeId, TypeRegistry,
};
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Debug, Default)]
struct Customer {
    number: u32,
    name: String,
    referrer: Option<ObjRef>,
}

fn customer_name(c: &Customer) -> &str {
    &c.name
}

fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::new();
    registry
        .register_type_handler(Arc::new(
            CustomTypeHandler::builder(TypeId(1000), "Customer", Customer::default)
                .field(BinaryField::value_mut(
                    "number",
                    |c: &Customer| c.number,
                    |c, v| c.number = v,
                ))
                .field(BinaryField::text_mut("name", customer_name, |c, v| c.name = v))
                .field(BinaryField::reference_mut(
                    "referrer",
                    |c: &Customer| c.referrer,
                    |c, v| c.referrer = v,
                ))
                .build(),
        ))
        .expect("customer");
    Arc::new(registry)
}

fn populate(db_path: &std::path::Path) {
    let mut session = Session::open(db_path, registry()).expect("open");
    let graph = session.graph_mut();
    let ann = graph
        .insert(Customer {
            number: 1,
            name: "Ann".to_string(),
            referrer: None,
        })
        .expect("ann");
    let bob = graph
        .insert(Customer {
            number: 2,
            name: "Bob".to_string(),
            referrer: Some(ann),
        })
        .expect("bob");
    session.store_roots(&[bob]).expect("store");
}

fn definition(type_id: u64, name: &str, members: &[(&str, FieldKind)]) -> TypeDefinition {
    TypeDefinition::new(
        TypeId(type_id),
        name,
        None,
        members
            .iter()
            .map(|(member, kind)| FieldDescriptor::new(MemberIdentifier::new(*member), *kind))
            .collect(),
    )
    .expect("definition")
}

// =============================================================================
// STORE COMMANDS
// =============================================================================

#[test]
fn test_init_refuses_existing_store() {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("app.redb");

    cmd_init(&db_path, false).unwrap();
    assert!(db_path.exists());
    assert!(matches!(
        cmd_init(&db_path, false),
        Err(LodestoreError::IoError(_))
    ));
    cmd_init(&db_path, true).unwrap();
}

#[test]
fn test_commands_require_existing_store() {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("missing.redb");
    assert!(cmd_status(&db_path, false).is_err());
    assert!(!db_path.exists());
}

#[test]
fn test_status_types_and_check_on_populated_store() {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("app.redb");
    populate(&db_path);

    cmd_status(&db_path, true).unwrap();
    cmd_types(&db_path, false).unwrap();
    cmd_check(&db_path, true).unwrap();

    let session = open_session(&db_path).unwrap();
    let status = session.status().unwrap();
    assert_eq!(status.entity_count, 2);
    assert_eq!(status.type_count, 1);
    assert_eq!(session.check().unwrap().reachable, 2);
}

#[test]
fn test_dictionary_export_import() {
    let temp = tempdir().unwrap();
    let source_db = temp.path().join("source.redb");
    let target_db = temp.path().join("target.redb");
    let dictionary_file = temp.path().join("types.dict");
    populate(&source_db);

    cmd_export_dictionary(&source_db, &dictionary_file).unwrap();
    let exported = read_dictionary(&dictionary_file).unwrap();
    assert_eq!(exported.len(), 1);
    assert!(exported.lookup_by_name("Customer").is_some());

    cmd_init(&target_db, false).unwrap();
    cmd_import_dictionary(&target_db, &dictionary_file).unwrap();
    let session = open_session(&target_db).unwrap();
    assert_eq!(session.status().unwrap().type_count, 1);
}

#[test]
fn test_import_rejects_conflicting_layout() {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("app.redb");
    let dictionary_file = temp.path().join("conflict.dict");
    populate(&db_path);

    let conflicting = TypeDictionary::from_definitions([definition(
        1000,
        "Customer",
        &[("number", FieldKind::Primitive(PrimitiveKind::U64))],
    )])
    .unwrap();
    std::fs::write(
        &dictionary_file,
        lodestore_core::dictionary_to_bytes(&conflicting).unwrap(),
    )
    .unwrap();

    assert!(matches!(
        cmd_import_dictionary(&db_path, &dictionary_file),
        Err(LodestoreError::TypeDefinitionMismatch { .. })
    ));
}

// =============================================================================
// SUGGEST
// =============================================================================

#[test]
fn test_suggest_uses_configured_refactorings() {
    let legacy = TypeDictionary::from_definitions([
        definition(
            1000,
            "Client",
            &[
                ("number", FieldKind::Primitive(PrimitiveKind::U32)),
                ("surname", FieldKind::Text),
                ("fax", FieldKind::Reference),
            ],
        ),
        definition(1001, "Invoice", &[("total", FieldKind::Primitive(PrimitiveKind::U64))]),
    ])
    .unwrap();
    let current = TypeDictionary::from_definitions([definition(
        2000,
        "Customer",
        &[
            ("number", FieldKind::Primitive(PrimitiveKind::U32)),
            ("last_name", FieldKind::Text),
            ("email", FieldKind::Reference),
        ],
    )])
    .unwrap();

    let config = LodestoreConfig::from_toml(
        r#"
[refactoring]
entries = [
    { source = "Client", target = "Customer" },
    { source = "Client#surname", target = "Customer#last_name" },
    { source = "Client#fax" },
]
"#,
    )
    .unwrap();

    let suggestions = suggest_mappings(&config, &legacy, &current, None, None).unwrap();
    assert_eq!(suggestions.len(), 2);

    let client = &suggestions[0];
    assert_eq!(client.target_type.as_deref(), Some("Customer"));
    assert_eq!(client.resolution, "renamed");
    let kinds: Vec<(&str, &str)> = client
        .members
        .iter()
        .map(|m| (m.source.as_str(), m.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("number", "exact"),
            ("fax", "deleted"),
            ("surname", "explicit"),
        ]
    );
    assert_eq!(client.new_targets, vec!["email".to_string()]);

    let invoice = &suggestions[1];
    assert_eq!(invoice.resolution, "missing");
    assert!(invoice.members.is_empty());
}

#[test]
fn test_suggest_filters_by_type_name() {
    let legacy = TypeDictionary::from_definitions([
        definition(1, "A", &[("x", FieldKind::Reference)]),
        definition(2, "B", &[("y", FieldKind::Reference)]),
    ])
    .unwrap();
    let suggestions =
        suggest_mappings(&LodestoreConfig::default(), &legacy, &legacy, Some("B"), None).unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].source_type, "B");
    assert_eq!(suggestions[0].resolution, "unchanged");
    assert_eq!(suggestions[0].members[0].kind, "exact");
}

#[test]
fn test_suggest_rejects_rename_to_unknown_type() {
    let legacy = TypeDictionary::from_definitions([definition(
        1,
        "Client",
        &[("number", FieldKind::Primitive(PrimitiveKind::U32))],
    )])
    .unwrap();
    let current = TypeDictionary::from_definitions([definition(
        5,
        "Customer",
        &[("number", FieldKind::Primitive(PrimitiveKind::U32))],
    )])
    .unwrap();
    let config = LodestoreConfig::from_toml(
        r#"
[refactoring]
entries = [{ source = "Client", target = "Ghost" }]
"#,
    )
    .unwrap();

    let err = suggest_mappings(&config, &legacy, &current, None, None).unwrap_err();
    assert_eq!(
        err,
        LodestoreError::UnresolvableTypeMapping {
            source_id: "Client".to_string(),
            target_id: "Ghost".to_string(),
        }
    );
}
