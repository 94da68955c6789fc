//! # Validation Tier Tests (T0-T4)
//!
//! If ANY tier fails, the engine is INVALID.
//!
//! ## Tiers
//! - T0: Layout Derivation
//! - T1: Type Registry
//! - T2: Traversal and Graph Round Trip
//! - T3: Refactoring Resolution
//! - T4: Durable Storage

use lodestore_core::{
    BinaryField, CustomTypeHandler, FieldDescriptor, FieldKind, LodestoreError, MemberIdentifier,
    ObjRef, ObjectGraph, ObjectId, ObjectIdRegistry, PrimitiveKind, TypeDefinition,
    TypeDictionary, TypeId, TypeRegistry,
};
use std::sync::Arc;

#[derive(Debug, Default, Clone, PartialEq)]
struct Account {
    number: u64,
    holder: String,
    parent: Option<ObjRef>,
}

fn holder(a: &Account) -> &str {
    &a.holder
}

fn account_handler() -> CustomTypeHandler<Account> {
    CustomTypeHandler::builder(TypeId(1000), "Account", Account::default)
        .field(BinaryField::text_mut("holder", holder, |a, v| a.holder = v))
        .field(BinaryField::value_mut(
            "number",
            |a: &Account| a.number,
            |a, v| a.number = v,
        ))
        .field(BinaryField::reference_mut(
            "parent",
            |a: &Account| a.parent,
            |a, v| a.parent = v,
        ))
        .build()
}

fn registry() -> TypeRegistry {
    let registry = TypeRegistry::new();
    registry
        .register_type_handler(Arc::new(account_handler()))
        .expect("account");
    registry
}

fn field(name: &str, kind: FieldKind) -> FieldDescriptor {
    FieldDescriptor::new(MemberIdentifier::new(name), kind)
}

fn account_definition() -> TypeDefinition {
    TypeDefinition::new(
        TypeId(1000),
        "Account",
        None,
        vec![
            field("holder", FieldKind::Text),
            field("number", FieldKind::Primitive(PrimitiveKind::U64)),
            field("parent", FieldKind::Reference),
        ],
    )
    .expect("definition")
}

// =============================================================================
// TIER T0: LAYOUT DERIVATION
// =============================================================================

mod t0_layout {
    use super::*;

    /// T0.1: The variable-length field moves behind every fixed field.
    #[test]
    fn variable_field_is_last() {
        let definition = account_definition();
        let names: Vec<&str> = definition.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["number", "parent", "holder"]);

        let offsets: Vec<Option<u64>> = definition.members().iter().map(|m| m.offset()).collect();
        assert_eq!(offsets, vec![Some(0), Some(8), Some(16)]);
    }

    /// T0.2: Deriving the same declarations twice yields identical layouts.
    #[test]
    fn layout_is_deterministic() {
        assert_eq!(account_definition(), account_definition());
    }

    /// T0.3: Persisted length bounds follow the field kinds.
    #[test]
    fn length_bounds() {
        let definition = account_definition();
        assert_eq!(definition.members_persisted_length_minimum(), 24);
        assert!(definition.accepts_length(24));
        assert!(definition.accepts_length(30));
        assert!(!definition.accepts_length(23));
    }

    /// T0.4: Two variable-length fields are rejected.
    #[test]
    fn two_variable_fields_rejected() {
        let result = TypeDefinition::new(
            TypeId(1),
            "Broken",
            None,
            vec![field("a", FieldKind::Text), field("b", FieldKind::Bytes)],
        );
        assert!(matches!(
            result,
            Err(LodestoreError::MultipleVariableLengthFields { .. })
        ));
    }

    /// T0.5: Duplicate and unnamed fields are rejected.
    #[test]
    fn duplicate_and_unnamed_rejected() {
        let duplicate = TypeDefinition::new(
            TypeId(1),
            "Broken",
            None,
            vec![field("a", FieldKind::Reference), field("a", FieldKind::Reference)],
        );
        assert!(matches!(duplicate, Err(LodestoreError::DuplicateField(_))));

        let unnamed = TypeDefinition::new(TypeId(1), "Broken", None, vec![field("", FieldKind::Reference)]);
        assert!(matches!(unnamed, Err(LodestoreError::UnnamedField { .. })));
    }
}

// =============================================================================
// TIER T1: TYPE REGISTRY
// =============================================================================

mod t1_registry {
    use super::*;

    /// T1.1: A custom handler registers the same layout as its declared
    /// definition.
    #[test]
    fn handler_layout_matches_definition() {
        let registry = registry();
        let registered = registry.lookup_type_by_id(TypeId(1000)).expect("registered");
        assert!(registered.is_layout_equal(&account_definition()));
    }

    /// T1.2: Re-registering an equal description is idempotent.
    #[test]
    fn equal_description_is_idempotent() {
        let registry = registry();
        registry
            .register_type_description(account_definition())
            .expect("idempotent");
    }

    /// T1.3: A stored layout that differs from the runtime one fails
    /// validation.
    #[test]
    fn layout_mismatch_detected() {
        let registry = registry();
        let stored = TypeDefinition::new(
            TypeId(1000),
            "Account",
            None,
            vec![field("number", FieldKind::Primitive(PrimitiveKind::U32))],
        )
        .expect("definition");
        let dictionary = TypeDictionary::from_definitions([stored]).expect("dictionary");
        assert!(matches!(
            registry.validate(&dictionary),
            Err(LodestoreError::TypeDefinitionMismatch { .. })
        ));
    }

    /// T1.4: Initialize is idempotent for the same dictionary only.
    #[test]
    fn initialize_once() {
        let registry = registry();
        let dictionary = Arc::new(
            TypeDictionary::from_definitions([account_definition()]).expect("dictionary"),
        );
        registry.initialize(Arc::clone(&dictionary)).expect("first");
        registry.initialize(Arc::clone(&dictionary)).expect("same");
        assert_eq!(
            registry.initialize(Arc::new(TypeDictionary::new())).err(),
            Some(LodestoreError::AlreadyInitialized)
        );
    }

    /// T1.5: Entity lengths outside the type's bounds are rejected.
    #[test]
    fn entity_length_validated() {
        let registry = registry();
        registry
            .validate_entity(24, TypeId(1000), ObjectId(1))
            .expect("valid");
        assert!(matches!(
            registry.validate_entity(8, TypeId(1000), ObjectId(1)),
            Err(LodestoreError::InvalidEntityLength { .. })
        ));
        assert!(matches!(
            registry.validate_entity(24, TypeId(77), ObjectId(1)),
            Err(LodestoreError::UnknownEntityType { .. })
        ));
    }
}

// =============================================================================
// TIER T2: TRAVERSAL AND GRAPH ROUND TRIP
// =============================================================================

mod t2_round_trip {
    use super::*;
    use lodestore_core::graph::GraphTraverserProvider;
    use lodestore_core::{Loader, ReferenceHandler, Storer};
    use std::ops::ControlFlow;

    fn chain(graph: &mut ObjectGraph, length: u64) -> Vec<ObjRef> {
        let mut refs = Vec::new();
        for number in 0..length {
            let parent = refs.last().copied();
            let account = Account {
                number,
                holder: format!("holder-{number}"),
                parent,
            };
            refs.push(graph.insert(account).expect("insert"));
        }
        refs
    }

    /// T2.1: Every reachable instance is visited exactly once, even through
    /// a cycle.
    #[test]
    fn single_visit_through_cycle() {
        let registry = registry();
        let mut graph = ObjectGraph::new();
        let refs = chain(&mut graph, 4);
        graph.get_mut::<Account>(refs[0]).expect("first").parent = Some(refs[3]);

        let provider = GraphTraverserProvider::new(&graph, &registry);
        let mut visits = Vec::new();
        let summary = ReferenceHandler::new(&provider)
            .handle([refs[3], refs[3]], |node, _| {
                visits.push(node);
                Ok(ControlFlow::Continue(()))
            })
            .expect("traversal");
        assert_eq!(summary.visited(), 4);
        assert_eq!(visits, vec![refs[3], refs[2], refs[1], refs[0]]);
    }

    /// T2.2: A cyclic graph survives a store/load round trip.
    #[test]
    fn cyclic_round_trip() {
        let registry = registry();
        let mut graph = ObjectGraph::new();
        let refs = chain(&mut graph, 3);
        graph.get_mut::<Account>(refs[0]).expect("first").parent = Some(refs[2]);

        let mut ids = ObjectIdRegistry::new();
        let chunk = Storer::new(&registry)
            .store(&graph, &[refs[2]], &mut ids)
            .expect("store");
        assert_eq!(chunk.entity_count, 3);

        let mut loaded = ObjectGraph::new();
        let mut loaded_ids = ObjectIdRegistry::new();
        let instances = Loader::new(&registry)
            .load(&mut loaded, &mut loaded_ids, &chunk.bytes)
            .expect("load");
        assert_eq!(instances.len(), 3);

        let root = loaded_ids.object_ref(chunk.roots[0]).expect("root");
        let mut current = root;
        let mut numbers = Vec::new();
        for _ in 0..3 {
            let account = loaded.get::<Account>(current).expect("account");
            numbers.push(account.number);
            current = account.parent.expect("parent");
        }
        assert_eq!(numbers, vec![2, 1, 0]);
        assert_eq!(current, root);
    }

    /// T2.3: Deep chains do not grow the call stack.
    #[test]
    fn deep_chain_round_trip() {
        let registry = registry();
        let mut graph = ObjectGraph::new();
        let refs = chain(&mut graph, 20_000);
        let last = refs[refs.len() - 1];

        let mut ids = ObjectIdRegistry::new();
        let chunk = Storer::new(&registry)
            .store(&graph, &[last], &mut ids)
            .expect("store");
        assert_eq!(chunk.entity_count, 20_000);
    }
}

// =============================================================================
// TIER T3: REFACTORING RESOLUTION
// =============================================================================

mod t3_refactoring {
    use super::*;
    use lodestore_core::{
        LegacyMemberMapper, MatchKind, MemberSimilarity, RefactoringMapping,
        RefactoringResolver, TypeResolution, TypeSimilarity,
    };

    fn legacy() -> TypeDefinition {
        TypeDefinition::new(
            TypeId(900),
            "Account",
            None,
            vec![
                field("owner", FieldKind::Text),
                field("number", FieldKind::Primitive(PrimitiveKind::U64)),
                field("audit", FieldKind::Reference),
            ],
        )
        .expect("legacy")
    }

    /// T3.1: A deletion entry differs from a missing entry.
    #[test]
    fn deletion_is_not_absence() {
        let mapping: RefactoringMapping = [("Account#audit", None)].into_iter().collect();
        let resolver = RefactoringResolver::new(mapping);
        let legacy = legacy();
        let current = account_definition();

        let audit = legacy.member_named("audit").expect("audit");
        let deleted = resolver
            .resolve_member(&legacy, audit, &current)
            .expect("resolve")
            .expect("entry");
        assert_eq!(deleted.target, None);

        let number = legacy.member_named("number").expect("number");
        assert_eq!(
            resolver.resolve_member(&legacy, number, &current).expect("resolve"),
            None
        );
    }

    /// T3.2: Type renames resolve through the id-qualified key first.
    #[test]
    fn type_rename() {
        let mapping: RefactoringMapping = [
            ("900:Account", Some("Ledger".to_string())),
            ("Account", Some("Book".to_string())),
        ]
        .into_iter()
        .collect();
        let resolver = RefactoringResolver::new(mapping);
        assert_eq!(
            resolver.resolve_type_name(&legacy()),
            TypeResolution::Renamed("Ledger".to_string())
        );
    }

    /// T3.3: The mapper combines explicit, exact and similarity matches.
    #[test]
    fn full_member_mapping() {
        let mapping: RefactoringMapping = [
            ("#owner", Some("#holder".to_string())),
            ("#audit", None),
        ]
        .into_iter()
        .collect();
        let resolver = RefactoringResolver::new(mapping);
        let similarity = MemberSimilarity::new(TypeSimilarity::new());
        let result = LegacyMemberMapper::new(&resolver, &similarity)
            .map_members(&legacy(), &account_definition())
            .expect("mapping");

        let kinds: Vec<(&str, MatchKind)> = result
            .matched
            .iter()
            .map(|m| (m.source.name(), m.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("number", MatchKind::Exact),
                ("audit", MatchKind::Deleted),
                ("owner", MatchKind::Explicit),
            ]
        );
        let new: Vec<&str> = result.new_targets.iter().map(|m| m.name()).collect();
        assert_eq!(new, vec!["parent"]);
        assert!(result.unmatched_sources.is_empty());
    }
}

// =============================================================================
// TIER T4: DURABLE STORAGE
// =============================================================================

mod t4_storage {
    use super::*;
    use lodestore_core::{Session, dictionary_from_bytes, dictionary_to_bytes};
    use tempfile::tempdir;

    /// T4.1: A session stores and reloads through redb.
    #[test]
    fn session_round_trip() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        {
            let mut session = Session::open(&db_path, Arc::new(registry())).expect("open");
            let graph = session.graph_mut();
            let parent = graph
                .insert(Account {
                    number: 1,
                    holder: "Ann".to_string(),
                    parent: None,
                })
                .expect("parent");
            let child = graph
                .insert(Account {
                    number: 2,
                    holder: "Bob".to_string(),
                    parent: Some(parent),
                })
                .expect("child");
            session.store_roots(&[child]).expect("store");
        }

        let mut session = Session::open(&db_path, Arc::new(registry())).expect("reopen");
        let roots = session.load_roots().expect("load");
        let child = session.graph().get::<Account>(roots[0]).expect("child");
        assert_eq!(child.holder, "Bob");
        let parent = session
            .graph()
            .get::<Account>(child.parent.expect("parent"))
            .expect("parent");
        assert_eq!(parent.holder, "Ann");
        assert!(session.check().expect("check").is_consistent());
    }

    /// T4.2: The dictionary file round trips and rejects foreign data.
    #[test]
    fn dictionary_file() {
        let dictionary = TypeDictionary::from_definitions([account_definition()]).expect("dictionary");
        let bytes = dictionary_to_bytes(&dictionary).expect("serialize");
        assert_eq!(&bytes[..4], b"LODE");
        assert_eq!(dictionary_from_bytes(&bytes).expect("deserialize"), dictionary);

        let mut foreign = bytes;
        foreign[0] = b'X';
        assert!(matches!(
            dictionary_from_bytes(&foreign),
            Err(LodestoreError::DeserializationError(_))
        ));
    }
}
