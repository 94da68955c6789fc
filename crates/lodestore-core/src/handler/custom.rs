//! # Custom Type Handler
//!
//! The general-purpose handler for a Rust struct described by explicit
//! [`BinaryField`] accessors.
//!
//! Layout derivation is deferred to first use and runs exactly once, even
//! under concurrent first use. A failed derivation is remembered and
//! reported by every later call.

use crate::binary::{BinaryWriter, EntityData, EntityHeader};
use crate::definition::TypeDefinition;
use crate::field::{FieldDescriptor, FieldKind};
use crate::handler::entity::iterate_record_references;
use crate::handler::field::decode_text;
use crate::handler::{
    BinaryField, Completable, Instance, LoadHandler, Primitive, Referring, RuntimeType, Storable,
    StoreHandler, TypeHandler,
};
use crate::layout::{FieldLayout, LayoutMember, derive_layout};
use crate::{LodestoreError, ObjRef, ObjectId, TypeId};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::OnceLock;

// =============================================================================
// INSTANTIATION
// =============================================================================

enum Instantiator<T> {
    /// Allocate a blank instance; `create` then sets the value fields.
    Bare(fn() -> T),
    /// Build the instance from its persisted values in one step.
    FromFields(fn(&FieldValues<'_>) -> Result<T, LodestoreError>),
}

/// Named access to the persisted values of one record, for types that are
/// constructed whole rather than filled in field by field.
#[derive(Debug, Clone, Copy)]
pub struct FieldValues<'a> {
    type_name: &'a str,
    members: &'a [FieldDescriptor],
    data: EntityData<'a>,
}

impl<'a> FieldValues<'a> {
    fn member(&self, name: &str) -> Result<(&'a FieldDescriptor, u64), LodestoreError> {
        let member = self
            .members
            .iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| LodestoreError::UnknownField {
                type_name: self.type_name.to_string(),
                field: name.to_string(),
            })?;
        let offset = member.offset().ok_or_else(|| {
            LodestoreError::CorruptRecord(format!("field {} has no offset", member.identifier))
        })?;
        Ok((member, offset))
    }

    fn expect_kind(
        &self,
        member: &FieldDescriptor,
        kind: FieldKind,
    ) -> Result<(), LodestoreError> {
        if member.kind == kind {
            Ok(())
        } else {
            Err(LodestoreError::InstanceTypeMismatch {
                expected: format!(
                    "{} field {} of {}",
                    kind.default_type_name(),
                    member.identifier,
                    self.type_name
                ),
            })
        }
    }

    /// Value of a primitive field.
    pub fn value<P: Primitive>(&self, name: &str) -> Result<P, LodestoreError> {
        let (member, offset) = self.member(name)?;
        self.expect_kind(member, FieldKind::Primitive(P::KIND))?;
        P::read_le(self.data.slice(offset, member.minimum_length())?)
    }

    /// Payload of a bytes field.
    pub fn bytes(&self, name: &str) -> Result<&'a [u8], LodestoreError> {
        let (member, offset) = self.member(name)?;
        self.expect_kind(member, FieldKind::Bytes)?;
        self.data.read_variable(offset)
    }

    /// Content of a text field.
    pub fn text(&self, name: &str) -> Result<String, LodestoreError> {
        let (member, offset) = self.member(name)?;
        self.expect_kind(member, FieldKind::Text)?;
        decode_text(self.data.read_variable(offset)?)
    }

    pub fn object_id(&self) -> ObjectId {
        self.data.object_id()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Collects the field declarations of a [`CustomTypeHandler`].
pub struct CustomTypeHandlerBuilder<T> {
    type_id: TypeId,
    type_name: String,
    instantiator: Instantiator<T>,
    fields: Vec<BinaryField<T>>,
    on_complete: Option<fn(&mut T)>,
}

impl<T: Any + Send + Sync> CustomTypeHandlerBuilder<T> {
    /// Declare the next field. Declaration order is layout order, except
    /// that a variable-length field always moves to the end.
    #[must_use]
    pub fn field(mut self, field: BinaryField<T>) -> Self {
        self.fields.push(field);
        self
    }

    /// Hook run in the `complete` phase, after references are resolved.
    #[must_use]
    pub fn on_complete(mut self, hook: fn(&mut T)) -> Self {
        self.on_complete = Some(hook);
        self
    }

    #[must_use]
    pub fn build(self) -> CustomTypeHandler<T> {
        CustomTypeHandler {
            type_id: self.type_id,
            type_name: self.type_name,
            instantiator: self.instantiator,
            on_complete: self.on_complete,
            pending: Mutex::new(Some(self.fields)),
            state: OnceLock::new(),
        }
    }
}

// =============================================================================
// HANDLER
// =============================================================================

struct Initialized<T> {
    fields: Vec<BinaryField<T>>,
    layout: FieldLayout,
    definition: TypeDefinition,
}

/// Handler for a struct `T` described by explicit field accessors.
pub struct CustomTypeHandler<T> {
    type_id: TypeId,
    type_name: String,
    instantiator: Instantiator<T>,
    on_complete: Option<fn(&mut T)>,
    pending: Mutex<Option<Vec<BinaryField<T>>>>,
    state: OnceLock<Result<Initialized<T>, LodestoreError>>,
}

impl<T> std::fmt::Debug for CustomTypeHandler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomTypeHandler")
            .field("type_id", &self.type_id)
            .field("type_name", &self.type_name)
            .field("initialized", &self.state.get().is_some())
            .finish_non_exhaustive()
    }
}

fn downcast<T: Any>(instance: &dyn Any) -> Result<&T, LodestoreError> {
    instance
        .downcast_ref::<T>()
        .ok_or_else(|| LodestoreError::InstanceTypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
        })
}

fn downcast_mut<T: Any>(instance: &mut dyn Any) -> Result<&mut T, LodestoreError> {
    instance
        .downcast_mut::<T>()
        .ok_or_else(|| LodestoreError::InstanceTypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
        })
}

impl<T: Any + Send + Sync> CustomTypeHandler<T> {
    /// Start a handler for a mutable type allocated blank by `instantiate`.
    #[must_use]
    pub fn builder(
        type_id: TypeId,
        type_name: impl Into<String>,
        instantiate: fn() -> T,
    ) -> CustomTypeHandlerBuilder<T> {
        Self::builder_with(type_id, type_name, Instantiator::Bare(instantiate))
    }

    /// Start a handler for a type constructed whole from its persisted
    /// values, typically an immutable value type without setters.
    #[must_use]
    pub fn builder_from_fields(
        type_id: TypeId,
        type_name: impl Into<String>,
        construct: fn(&FieldValues<'_>) -> Result<T, LodestoreError>,
    ) -> CustomTypeHandlerBuilder<T> {
        Self::builder_with(type_id, type_name, Instantiator::FromFields(construct))
    }

    fn builder_with(
        type_id: TypeId,
        type_name: impl Into<String>,
        instantiator: Instantiator<T>,
    ) -> CustomTypeHandlerBuilder<T> {
        CustomTypeHandlerBuilder {
            type_id,
            type_name: type_name.into(),
            instantiator,
            fields: Vec::new(),
            on_complete: None,
        }
    }

    fn initialized(&self) -> Result<&Initialized<T>, LodestoreError> {
        self.state
            .get_or_init(|| {
                let fields = self.pending.lock().take().unwrap_or_default();
                self.initialize(fields)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn initialize(&self, mut fields: Vec<BinaryField<T>>) -> Result<Initialized<T>, LodestoreError> {
        let layout = derive_layout(&self.type_name, &mut fields).inspect_err(|e| {
            tracing::warn!(type_name = %self.type_name, error = %e, "type handler initialization failed");
        })?;
        let definition = TypeDefinition::new(
            self.type_id,
            self.type_name.clone(),
            Some(std::any::type_name::<T>().to_string()),
            fields
                .iter()
                .map(|f| f.descriptor().clone())
                .collect(),
        )?;
        tracing::debug!(
            type_id = %self.type_id,
            type_name = %self.type_name,
            fields = fields.len(),
            "type handler initialized"
        );
        Ok(Initialized {
            fields,
            layout,
            definition,
        })
    }

    fn set_values(
        init: &Initialized<T>,
        instance: &mut T,
        data: &EntityData<'_>,
    ) -> Result<(), LodestoreError> {
        for &index in &init.layout.setting_non_references {
            init.fields[index].set_value(instance, data)?;
        }
        Ok(())
    }

    fn set_references(
        init: &Initialized<T>,
        instance: &mut T,
        data: &EntityData<'_>,
        handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError> {
        for &index in &init.layout.setting_references {
            init.fields[index].set_references(instance, data, handler)?;
        }
        Ok(())
    }
}

impl<T: Any + Send + Sync> Storable for CustomTypeHandler<T> {
    fn store(
        &self,
        out: &mut BinaryWriter,
        object_id: ObjectId,
        instance: &dyn Any,
        handler: &mut dyn StoreHandler,
    ) -> Result<(), LodestoreError> {
        let init = self.initialized()?;
        let instance = downcast::<T>(instance)?;

        let variable_length = init
            .layout
            .trailing_variable
            .map(|index| init.fields[index].persisted_length(instance))
            .unwrap_or(0);
        let header = EntityHeader {
            content_length: init
                .layout
                .fixed_length_binary_content
                .saturating_add(variable_length),
            type_id: self.type_id,
            object_id,
        };

        let mut record = BinaryWriter::new();
        record.begin_record(&header)?;
        for &index in &init.layout.storing {
            init.fields[index].store(instance, &mut record, handler)?;
        }
        out.write_bytes(record.as_bytes());
        Ok(())
    }

    fn create(&self, data: &EntityData<'_>) -> Result<Instance, LodestoreError> {
        let init = self.initialized()?;
        let mut instance = match &self.instantiator {
            Instantiator::Bare(instantiate) => instantiate(),
            Instantiator::FromFields(construct) => construct(&FieldValues {
                type_name: &self.type_name,
                members: init.definition.members(),
                data: *data,
            })?,
        };
        Self::set_values(init, &mut instance, data)?;
        Ok(Box::new(instance))
    }

    fn initialize_state(
        &self,
        data: &EntityData<'_>,
        instance: &mut dyn Any,
        handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError> {
        let init = self.initialized()?;
        Self::set_references(init, downcast_mut::<T>(instance)?, data, handler)
    }

    fn update_state(
        &self,
        data: &EntityData<'_>,
        instance: &mut dyn Any,
        handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError> {
        let init = self.initialized()?;
        let instance = downcast_mut::<T>(instance)?;

        if init.layout.has_setting_members() {
            Self::set_values(init, instance, data)?;
            return Self::set_references(init, instance, data, handler);
        }

        for &index in &init.layout.storing {
            let field = &init.fields[index];
            if !field.stored_matches(instance, data, handler)? {
                return Err(LodestoreError::StateMismatch {
                    type_name: self.type_name.clone(),
                    field: field.descriptor().identifier.to_string(),
                    object_id: data.object_id(),
                });
            }
        }
        Ok(())
    }
}

impl<T: Any + Send + Sync> Referring for CustomTypeHandler<T> {
    fn has_persisted_references(&self) -> bool {
        self.initialized()
            .map(|init| !init.layout.references.is_empty())
            .unwrap_or(false)
    }

    fn iterate_instance_references(
        &self,
        instance: &dyn Any,
        visit: &mut dyn FnMut(ObjRef),
    ) -> Result<(), LodestoreError> {
        let init = self.initialized()?;
        if init.layout.references.is_empty() {
            return Ok(());
        }
        let instance = downcast::<T>(instance)?;
        for &index in &init.layout.references {
            init.fields[index].iterate_references(instance, visit);
        }
        Ok(())
    }

    fn iterate_loadable_references(
        &self,
        data: &EntityData<'_>,
        visit: &mut dyn FnMut(ObjectId),
    ) -> Result<(), LodestoreError> {
        iterate_record_references(self.initialized()?.definition.members(), data, visit)
    }
}

impl<T: Any + Send + Sync> Completable for CustomTypeHandler<T> {
    fn complete(&self, _data: &EntityData<'_>, instance: &mut dyn Any) -> Result<(), LodestoreError> {
        if let Some(hook) = self.on_complete {
            hook(downcast_mut::<T>(instance)?);
        }
        Ok(())
    }
}

impl<T: Any + Send + Sync> TypeHandler for CustomTypeHandler<T> {
    fn type_definition(&self) -> Result<&TypeDefinition, LodestoreError> {
        self.initialized().map(|init| &init.definition)
    }

    fn type_id(&self) -> TypeId {
        self.type_id
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn runtime_type(&self) -> Option<RuntimeType> {
        Some(RuntimeType::of::<T>())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Default, PartialEq)]
    struct Pair {
        a: u64,
        b: u64,
    }

    fn pair_handler() -> CustomTypeHandler<Pair> {
        CustomTypeHandler::builder(TypeId(1000), "Pair", Pair::default)
            .field(BinaryField::value_mut("a", |p: &Pair| p.a, |p, v| p.a = v))
            .field(BinaryField::value_mut("b", |p: &Pair| p.b, |p, v| p.b = v))
            .build()
    }

    #[derive(Debug, Default, PartialEq)]
    struct Note {
        label: String,
        id: u64,
    }

    fn note_label(note: &Note) -> &str {
        &note.label
    }

    fn note_handler() -> CustomTypeHandler<Note> {
        CustomTypeHandler::builder(TypeId(1001), "Note", Note::default)
            .field(BinaryField::text_mut("label", note_label, |n, v| n.label = v))
            .field(BinaryField::value_mut("id", |n: &Note| n.id, |n, v| n.id = v))
            .build()
    }

    #[derive(Debug, PartialEq)]
    struct Money {
        cents: i64,
        currency: u32,
    }

    fn money_handler() -> CustomTypeHandler<Money> {
        CustomTypeHandler::builder_from_fields(TypeId(1002), "Money", |values| {
            Ok(Money {
                cents: values.value("cents")?,
                currency: values.value("currency")?,
            })
        })
        .field(BinaryField::value("cents", |m: &Money| m.cents))
        .field(BinaryField::value("currency", |m: &Money| m.currency))
        .build()
    }

    #[derive(Debug, Default)]
    struct Peer {
        name: u32,
        other: Option<ObjRef>,
    }

    fn peer_handler() -> CustomTypeHandler<Peer> {
        CustomTypeHandler::builder(TypeId(1003), "Peer", Peer::default)
            .field(BinaryField::value_mut("name", |p: &Peer| p.name, |p, v| p.name = v))
            .field(
                BinaryField::reference_mut("other", |p: &Peer| p.other, |p, v| p.other = v)
                    .of_type("Peer"),
            )
            .build()
    }

    /// Assigns object ids 100, 101, ... in first-seen order.
    #[derive(Default)]
    struct Ids(BTreeMap<ObjRef, ObjectId>);

    impl StoreHandler for Ids {
        fn apply(&mut self, reference: ObjRef) -> Result<ObjectId, LodestoreError> {
            let next = ObjectId(100 + self.0.len() as u64);
            Ok(*self.0.entry(reference).or_insert(next))
        }
    }

    struct Refs(BTreeMap<ObjectId, ObjRef>);

    impl LoadHandler for Refs {
        fn lookup_reference(&self, id: ObjectId) -> Result<Option<ObjRef>, LodestoreError> {
            if id.is_null() {
                return Ok(None);
            }
            self.0
                .get(&id)
                .copied()
                .map(Some)
                .ok_or(LodestoreError::UnresolvedReference(id))
        }
    }

    fn store_one<H: TypeHandler>(handler: &H, oid: u64, instance: &dyn Any) -> Vec<u8> {
        let mut out = BinaryWriter::new();
        handler
            .store(&mut out, ObjectId(oid), instance, &mut Ids::default())
            .expect("store");
        out.into_bytes()
    }

    fn load_one<H: TypeHandler, T: Any>(handler: &H, bytes: &[u8]) -> Box<T> {
        let data = EntityData::parse(bytes).expect("parse");
        let mut instance = handler.create(&data).expect("create");
        let refs = Refs(BTreeMap::new());
        handler
            .initialize_state(&data, instance.as_mut(), &refs)
            .expect("initialize");
        handler.complete(&data, instance.as_mut()).expect("complete");
        instance.downcast::<T>().expect("type")
    }

    #[test]
    fn fixed_record_roundtrip() {
        let handler = pair_handler();
        let original = Pair { a: 7, b: u64::MAX };
        let bytes = store_one(&handler, 1, &original);

        let data = EntityData::parse(&bytes).expect("parse");
        assert_eq!(data.content_length(), 16);
        assert_eq!(data.type_id(), TypeId(1000));
        assert_eq!(data.object_id(), ObjectId(1));

        let restored: Box<Pair> = load_one(&handler, &bytes);
        assert_eq!(*restored, original);
    }

    #[test]
    fn trailing_variable_record_roundtrip() {
        let handler = note_handler();
        let original = Note {
            label: "grocery list".to_string(),
            id: 42,
        };
        let bytes = store_one(&handler, 5, &original);

        let data = EntityData::parse(&bytes).expect("parse");
        assert_eq!(data.content_length(), 8 + 8 + 12);
        assert_eq!(data.read_u64(0).expect("id"), 42);

        let restored: Box<Note> = load_one(&handler, &bytes);
        assert_eq!(*restored, original);

        let definition = handler.type_definition().expect("definition");
        assert_eq!(definition.members()[1].name(), "label");
        assert!(definition.accepts_length(data.content_length()));
    }

    #[test]
    fn immutable_type_constructed_from_fields() {
        let handler = money_handler();
        let original = Money {
            cents: -1250,
            currency: 978,
        };
        let bytes = store_one(&handler, 3, &original);
        let restored: Box<Money> = load_one(&handler, &bytes);
        assert_eq!(*restored, original);
    }

    #[test]
    fn immutable_update_validates_instead_of_overwriting() {
        let handler = money_handler();
        let bytes = store_one(
            &handler,
            3,
            &Money {
                cents: 10,
                currency: 1,
            },
        );
        let data = EntityData::parse(&bytes).expect("parse");
        let refs = Refs(BTreeMap::new());

        let mut same = Money {
            cents: 10,
            currency: 1,
        };
        handler
            .update_state(&data, &mut same, &refs)
            .expect("matching state");

        let mut drifted = Money {
            cents: 11,
            currency: 1,
        };
        let err = handler
            .update_state(&data, &mut drifted, &refs)
            .expect_err("mismatch");
        assert!(matches!(err, LodestoreError::StateMismatch { ref field, .. } if field == "cents"));
        assert_eq!(drifted.cents, 11);
    }

    #[test]
    fn mutable_update_refreshes_fields() {
        let handler = pair_handler();
        let bytes = store_one(&handler, 1, &Pair { a: 1, b: 2 });
        let data = EntityData::parse(&bytes).expect("parse");

        let mut live = Pair { a: 9, b: 9 };
        handler
            .update_state(&data, &mut live, &Refs(BTreeMap::new()))
            .expect("update");
        assert_eq!(live, Pair { a: 1, b: 2 });
    }

    #[test]
    fn two_phase_load_resolves_mutual_references() {
        let handler = peer_handler();
        let a = Peer {
            name: 1,
            other: Some(ObjRef(1)),
        };
        let b = Peer {
            name: 2,
            other: Some(ObjRef(0)),
        };

        let mut ids = Ids::default();
        ids.0.insert(ObjRef(0), ObjectId(10));
        ids.0.insert(ObjRef(1), ObjectId(11));
        let mut out = BinaryWriter::new();
        handler.store(&mut out, ObjectId(10), &a, &mut ids).expect("store a");
        let split = out.len();
        handler.store(&mut out, ObjectId(11), &b, &mut ids).expect("store b");
        let bytes = out.into_bytes();
        let data_a = EntityData::parse(&bytes[..split]).expect("a");
        let data_b = EntityData::parse(&bytes[split..]).expect("b");

        // Both instances exist before either reference is set.
        let mut arena: Vec<Instance> = vec![
            handler.create(&data_a).expect("create a"),
            handler.create(&data_b).expect("create b"),
        ];
        let refs = Refs(BTreeMap::from([
            (ObjectId(10), ObjRef(0)),
            (ObjectId(11), ObjRef(1)),
        ]));
        for (instance, data) in arena.iter_mut().zip([data_a, data_b]) {
            let peer = instance.downcast_ref::<Peer>().expect("peer");
            assert!(peer.other.is_none());
            handler
                .initialize_state(&data, instance.as_mut(), &refs)
                .expect("initialize");
        }

        let restored_a = arena[0].downcast_ref::<Peer>().expect("a");
        let restored_b = arena[1].downcast_ref::<Peer>().expect("b");
        assert_eq!(restored_a.name, 1);
        assert_eq!(restored_a.other, Some(ObjRef(1)));
        assert_eq!(restored_b.other, Some(ObjRef(0)));
    }

    #[test]
    fn null_reference_stored_as_null_id() {
        let handler = peer_handler();
        let bytes = store_one(&handler, 4, &Peer { name: 3, other: None });
        let data = EntityData::parse(&bytes).expect("parse");
        assert_eq!(data.read_object_id(4).expect("ref"), ObjectId::NULL);

        let mut seen = Vec::new();
        handler
            .iterate_loadable_references(&data, &mut |id| seen.push(id))
            .expect("iterate");
        assert!(seen.is_empty());
    }

    #[test]
    fn reference_traversal_without_references_is_noop() {
        let handler = pair_handler();
        assert!(!handler.has_persisted_references());

        let mut visited = 0;
        handler
            .iterate_instance_references(&Pair::default(), &mut |_| visited += 1)
            .expect("no-op");
        // Not even the instance type is checked when there is nothing to visit.
        handler
            .iterate_instance_references(&"not a pair", &mut |_| visited += 1)
            .expect("no-op");
        assert_eq!(visited, 0);
    }

    #[test]
    fn wrong_instance_type_rejected() {
        let handler = pair_handler();
        let err = handler
            .store(&mut BinaryWriter::new(), ObjectId(1), &5u8, &mut Ids::default())
            .expect_err("mismatch");
        assert!(matches!(err, LodestoreError::InstanceTypeMismatch { .. }));
    }

    #[test]
    fn initialization_error_is_sticky() {
        let handler = CustomTypeHandler::builder(TypeId(2000), "Broken", Pair::default)
            .field(BinaryField::value_mut("a", |p: &Pair| p.a, |p, v| p.a = v))
            .field(BinaryField::value_mut("a", |p: &Pair| p.b, |p, v| p.b = v))
            .build();

        let first = handler.type_definition().expect_err("duplicate");
        assert_eq!(first, LodestoreError::DuplicateField("a".to_string()));
        let second = handler.type_definition().expect_err("still duplicate");
        assert_eq!(first, second);
        assert!(handler.create(&EntityData::parse(&[0; 24]).expect("empty")).is_err());
    }

    #[test]
    fn concurrent_first_use_initializes_once() {
        let handler = note_handler();
        let addresses: Vec<usize> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        std::ptr::from_ref(handler.type_definition().expect("definition")) as usize
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().expect("join"))
                .collect()
        });
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[derive(Debug, Default)]
    struct Crew {
        members: Vec<ObjRef>,
    }

    fn crew_members(c: &Crew) -> &[ObjRef] {
        &c.members
    }

    fn crew_record(ids: &[ObjectId]) -> Vec<u8> {
        let mut content = BinaryWriter::new();
        content.write_object_ids(ids);
        let mut record = BinaryWriter::new();
        record.write_header(&EntityHeader {
            content_length: content.len() as u64,
            type_id: TypeId(1005),
            object_id: ObjectId(1),
        });
        record.write_bytes(content.as_bytes());
        record.into_bytes()
    }

    #[test]
    fn reference_list_keeps_positions_or_fails() {
        let handler = CustomTypeHandler::builder(TypeId(1005), "Crew", Crew::default)
            .field(BinaryField::references_mut("members", crew_members, |c, v| c.members = v))
            .build();
        let refs = Refs(BTreeMap::from([
            (ObjectId(10), ObjRef(0)),
            (ObjectId(11), ObjRef(1)),
        ]));

        let bytes = crew_record(&[ObjectId(11), ObjectId(10), ObjectId(11)]);
        let data = EntityData::parse(&bytes).expect("parse");
        let mut crew = handler.create(&data).expect("create");
        handler
            .initialize_state(&data, crew.as_mut(), &refs)
            .expect("initialize");
        let crew = crew.downcast::<Crew>().expect("crew");
        assert_eq!(crew.members, vec![ObjRef(1), ObjRef(0), ObjRef(1)]);

        let bytes = crew_record(&[ObjectId(10), ObjectId::NULL]);
        let data = EntityData::parse(&bytes).expect("parse");
        let mut crew = handler.create(&data).expect("create");
        let err = handler
            .initialize_state(&data, crew.as_mut(), &refs)
            .expect_err("null in list");
        assert!(matches!(err, LodestoreError::CorruptRecord(_)));
    }

    #[test]
    fn completion_hook_runs() {
        let handler = CustomTypeHandler::builder(TypeId(1004), "Counter", Pair::default)
            .field(BinaryField::value_mut("a", |p: &Pair| p.a, |p, v| p.a = v))
            .on_complete(|p| p.b = p.a * 2)
            .build();
        let bytes = store_one(&handler, 1, &Pair { a: 21, b: 0 });
        let restored: Box<Pair> = load_one(&handler, &bytes);
        assert_eq!(restored.b, 42);
    }
}
