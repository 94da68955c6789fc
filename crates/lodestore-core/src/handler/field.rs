//! # Binary Fields
//!
//! Explicit accessors binding a field descriptor to a Rust struct member.
//! A field without a setter is persisted but never written back on load;
//! a type whose fields all lack setters is an immutable value type.

use crate::binary::{BinaryWriter, EntityData};
use crate::field::{FieldDescriptor, FieldKind, MemberIdentifier, PrimitiveKind};
use crate::handler::{LoadHandler, StoreHandler};
use crate::layout::LayoutMember;
use crate::{LodestoreError, ObjRef, ObjectId};

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A fixed-width value persisted little-endian.
pub trait Primitive: Copy + PartialEq + Send + Sync + 'static {
    const KIND: PrimitiveKind;

    fn write_le(self, out: &mut BinaryWriter);

    /// Decode from exactly `KIND.width()` bytes.
    fn read_le(bytes: &[u8]) -> Result<Self, LodestoreError>;
}

fn width_error(kind: PrimitiveKind, got: usize) -> LodestoreError {
    LodestoreError::CorruptRecord(format!(
        "expected {} bytes for {}, got {}",
        kind.width(),
        kind.name(),
        got
    ))
}

macro_rules! impl_primitive {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const KIND: PrimitiveKind = PrimitiveKind::$kind;

                fn write_le(self, out: &mut BinaryWriter) {
                    out.write_bytes(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Result<Self, LodestoreError> {
                    let array = bytes
                        .try_into()
                        .map_err(|_| width_error(Self::KIND, bytes.len()))?;
                    Ok(<$ty>::from_le_bytes(array))
                }
            }
        )*
    };
}

impl_primitive! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

impl Primitive for bool {
    const KIND: PrimitiveKind = PrimitiveKind::Bool;

    fn write_le(self, out: &mut BinaryWriter) {
        out.write_bytes(&[u8::from(self)]);
    }

    fn read_le(bytes: &[u8]) -> Result<Self, LodestoreError> {
        match bytes {
            [0] => Ok(false),
            [1] => Ok(true),
            [other] => Err(LodestoreError::CorruptRecord(format!(
                "invalid bool byte {}",
                other
            ))),
            _ => Err(width_error(Self::KIND, bytes.len())),
        }
    }
}

impl Primitive for char {
    const KIND: PrimitiveKind = PrimitiveKind::Char;

    fn write_le(self, out: &mut BinaryWriter) {
        out.write_bytes(&u32::from(self).to_le_bytes());
    }

    fn read_le(bytes: &[u8]) -> Result<Self, LodestoreError> {
        let code = u32::read_le(bytes).map_err(|_| width_error(Self::KIND, bytes.len()))?;
        char::from_u32(code)
            .ok_or_else(|| LodestoreError::CorruptRecord(format!("invalid char {:#x}", code)))
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

type StoreValue<T> = Box<dyn Fn(&T, &mut BinaryWriter) + Send + Sync>;
type LoadValue<T> = Box<dyn Fn(&mut T, &[u8]) -> Result<(), LodestoreError> + Send + Sync>;

enum Access<T> {
    Value {
        store: StoreValue<T>,
        load: Option<LoadValue<T>>,
    },
    Reference {
        get: fn(&T) -> Option<ObjRef>,
        set: Option<fn(&mut T, Option<ObjRef>)>,
    },
    Bytes {
        get: for<'a> fn(&'a T) -> &'a [u8],
        set: Option<fn(&mut T, Vec<u8>)>,
    },
    Text {
        get: for<'a> fn(&'a T) -> &'a str,
        set: Option<fn(&mut T, String)>,
    },
    References {
        get: for<'a> fn(&'a T) -> &'a [ObjRef],
        set: Option<fn(&mut T, Vec<ObjRef>)>,
    },
}

/// One persisted member of `T` with its accessors.
pub struct BinaryField<T> {
    descriptor: FieldDescriptor,
    access: Access<T>,
}

impl<T> std::fmt::Debug for BinaryField<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryField")
            .field("descriptor", &self.descriptor)
            .field("settable", &self.can_set())
            .finish()
    }
}

impl<T: 'static> BinaryField<T> {
    fn with(name: &str, kind: FieldKind, access: Access<T>) -> Self {
        Self {
            descriptor: FieldDescriptor::new(MemberIdentifier::new(name), kind),
            access,
        }
    }

    fn value_access<P: Primitive>(get: fn(&T) -> P, set: Option<fn(&mut T, P)>) -> Access<T> {
        Access::Value {
            store: Box::new(move |instance: &T, out: &mut BinaryWriter| {
                get(instance).write_le(out);
            }),
            load: set.map(|set| -> LoadValue<T> {
                Box::new(move |instance: &mut T, bytes: &[u8]| {
                    set(instance, P::read_le(bytes)?);
                    Ok(())
                })
            }),
        }
    }

    /// Read-only primitive member.
    #[must_use]
    pub fn value<P: Primitive>(name: &str, get: fn(&T) -> P) -> Self {
        Self::with(name, FieldKind::Primitive(P::KIND), Self::value_access(get, None))
    }

    /// Settable primitive member.
    #[must_use]
    pub fn value_mut<P: Primitive>(name: &str, get: fn(&T) -> P, set: fn(&mut T, P)) -> Self {
        Self::with(
            name,
            FieldKind::Primitive(P::KIND),
            Self::value_access(get, Some(set)),
        )
    }

    #[must_use]
    pub fn reference(name: &str, get: fn(&T) -> Option<ObjRef>) -> Self {
        Self::with(name, FieldKind::Reference, Access::Reference { get, set: None })
    }

    #[must_use]
    pub fn reference_mut(
        name: &str,
        get: fn(&T) -> Option<ObjRef>,
        set: fn(&mut T, Option<ObjRef>),
    ) -> Self {
        Self::with(
            name,
            FieldKind::Reference,
            Access::Reference {
                get,
                set: Some(set),
            },
        )
    }

    #[must_use]
    pub fn bytes(name: &str, get: for<'a> fn(&'a T) -> &'a [u8]) -> Self {
        Self::with(name, FieldKind::Bytes, Access::Bytes { get, set: None })
    }

    #[must_use]
    pub fn bytes_mut(
        name: &str,
        get: for<'a> fn(&'a T) -> &'a [u8],
        set: fn(&mut T, Vec<u8>),
    ) -> Self {
        Self::with(
            name,
            FieldKind::Bytes,
            Access::Bytes {
                get,
                set: Some(set),
            },
        )
    }

    #[must_use]
    pub fn text(name: &str, get: for<'a> fn(&'a T) -> &'a str) -> Self {
        Self::with(name, FieldKind::Text, Access::Text { get, set: None })
    }

    #[must_use]
    pub fn text_mut(name: &str, get: for<'a> fn(&'a T) -> &'a str, set: fn(&mut T, String)) -> Self {
        Self::with(
            name,
            FieldKind::Text,
            Access::Text {
                get,
                set: Some(set),
            },
        )
    }

    #[must_use]
    pub fn references(name: &str, get: for<'a> fn(&'a T) -> &'a [ObjRef]) -> Self {
        Self::with(
            name,
            FieldKind::ReferenceList,
            Access::References { get, set: None },
        )
    }

    #[must_use]
    pub fn references_mut(
        name: &str,
        get: for<'a> fn(&'a T) -> &'a [ObjRef],
        set: fn(&mut T, Vec<ObjRef>),
    ) -> Self {
        Self::with(
            name,
            FieldKind::ReferenceList,
            Access::References {
                get,
                set: Some(set),
            },
        )
    }

    /// Qualify the field with its declaring scope.
    #[must_use]
    pub fn declared_in(mut self, qualifier: &str) -> Self {
        self.descriptor.identifier.qualifier = Some(qualifier.to_string());
        self
    }

    /// Record the declared member type, e.g. the referenced type's name.
    #[must_use]
    pub fn of_type(mut self, type_name: &str) -> Self {
        self.descriptor.type_name = type_name.to_string();
        self
    }
}

impl<T> BinaryField<T> {
    pub(crate) fn offset(&self) -> Result<u64, LodestoreError> {
        self.descriptor.offset().ok_or_else(|| {
            LodestoreError::CorruptRecord(format!(
                "field {} used before layout derivation",
                self.descriptor.identifier
            ))
        })
    }

    /// Bytes this field occupies in the record of `instance`.
    pub(crate) fn persisted_length(&self, instance: &T) -> u64 {
        let payload = match &self.access {
            Access::Value { .. } | Access::Reference { .. } => {
                return self.descriptor.minimum_length();
            }
            Access::Bytes { get, .. } => get(instance).len() as u64,
            Access::Text { get, .. } => get(instance).len() as u64,
            Access::References { get, .. } => {
                (get(instance).len() as u64).saturating_mul(crate::primitives::REFERENCE_LENGTH)
            }
        };
        crate::primitives::LENGTH_PREFIX_LENGTH.saturating_add(payload)
    }

    pub(crate) fn store(
        &self,
        instance: &T,
        out: &mut BinaryWriter,
        handler: &mut dyn StoreHandler,
    ) -> Result<(), LodestoreError> {
        match &self.access {
            Access::Value { store, .. } => store(instance, out),
            Access::Reference { get, .. } => {
                let id = match get(instance) {
                    Some(reference) => handler.apply(reference)?,
                    None => ObjectId::NULL,
                };
                out.write_object_id(id);
            }
            Access::Bytes { get, .. } => out.write_variable(get(instance)),
            Access::Text { get, .. } => out.write_variable(get(instance).as_bytes()),
            Access::References { get, .. } => {
                let ids = get(instance)
                    .iter()
                    .map(|r| handler.apply(*r))
                    .collect::<Result<Vec<_>, _>>()?;
                out.write_object_ids(&ids);
            }
        }
        Ok(())
    }

    /// Set a non-reference field from the record.
    pub(crate) fn set_value(&self, instance: &mut T, data: &EntityData<'_>) -> Result<(), LodestoreError> {
        let offset = self.offset()?;
        match &self.access {
            Access::Value { load: Some(load), .. } => {
                load(instance, data.slice(offset, self.descriptor.minimum_length())?)
            }
            Access::Bytes { set: Some(set), .. } => {
                set(instance, data.read_variable(offset)?.to_vec());
                Ok(())
            }
            Access::Text { set: Some(set), .. } => {
                set(instance, decode_text(data.read_variable(offset)?)?);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Set a reference field, resolving object ids through `handler`.
    pub(crate) fn set_references(
        &self,
        instance: &mut T,
        data: &EntityData<'_>,
        handler: &dyn LoadHandler,
    ) -> Result<(), LodestoreError> {
        let offset = self.offset()?;
        match &self.access {
            Access::Reference { set: Some(set), .. } => {
                let target = handler.lookup_reference(data.read_object_id(offset)?)?;
                set(instance, target);
                Ok(())
            }
            Access::References { set: Some(set), .. } => {
                let targets = resolve_all(&data.read_object_ids(offset)?, handler)?;
                set(instance, targets);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Compare the persisted field with the instance's current state.
    pub(crate) fn stored_matches(
        &self,
        instance: &T,
        data: &EntityData<'_>,
        handler: &dyn LoadHandler,
    ) -> Result<bool, LodestoreError> {
        let offset = self.offset()?;
        Ok(match &self.access {
            Access::Value { store, .. } => {
                let mut current = BinaryWriter::new();
                store(instance, &mut current);
                data.slice(offset, self.descriptor.minimum_length())? == current.as_bytes()
            }
            Access::Reference { get, .. } => {
                handler.lookup_reference(data.read_object_id(offset)?)? == get(instance)
            }
            Access::Bytes { get, .. } => data.read_variable(offset)? == get(instance),
            Access::Text { get, .. } => data.read_variable(offset)? == get(instance).as_bytes(),
            Access::References { get, .. } => {
                let stored = data.read_object_ids(offset)?;
                let current = get(instance);
                stored.len() == current.len()
                    && stored
                        .iter()
                        .zip(current)
                        .map(|(id, r)| handler.lookup_reference(*id).map(|t| t == Some(*r)))
                        .collect::<Result<Vec<_>, _>>()?
                        .into_iter()
                        .all(|same| same)
            }
        })
    }

    pub(crate) fn iterate_references(&self, instance: &T, visit: &mut dyn FnMut(ObjRef)) {
        match &self.access {
            Access::Reference { get, .. } => {
                if let Some(reference) = get(instance) {
                    visit(reference);
                }
            }
            Access::References { get, .. } => get(instance).iter().copied().for_each(visit),
            _ => {}
        }
    }
}

impl<T> LayoutMember for BinaryField<T> {
    fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    fn descriptor_mut(&mut self) -> &mut FieldDescriptor {
        &mut self.descriptor
    }

    fn can_set(&self) -> bool {
        match &self.access {
            Access::Value { load, .. } => load.is_some(),
            Access::Reference { set, .. } => set.is_some(),
            Access::Bytes { set, .. } => set.is_some(),
            Access::Text { set, .. } => set.is_some(),
            Access::References { set, .. } => set.is_some(),
        }
    }
}

pub(crate) fn decode_text(bytes: &[u8]) -> Result<String, LodestoreError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| LodestoreError::CorruptRecord(format!("invalid UTF-8 text: {}", e)))
}

/// Resolve a stored reference list. Lists never hold the null id; ids the
/// load handler maps to no instance (records of deleted types) are left out.
fn resolve_all(ids: &[ObjectId], handler: &dyn LoadHandler) -> Result<Vec<ObjRef>, LodestoreError> {
    if ids.iter().any(|id| id.is_null()) {
        return Err(LodestoreError::CorruptRecord(
            "null object id in reference list".to_string(),
        ));
    }
    ids.iter()
        .filter_map(|id| handler.lookup_reference(*id).transpose())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
