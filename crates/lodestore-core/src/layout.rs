//! # Layout Derivation
//!
//! Turns a declared field sequence into a binary layout.
//!
//! ## Algorithm
//!
//! 1. Reject unnamed and duplicate fields.
//! 2. Allow at most one variable-length field and move it to the end.
//! 3. One forward pass assigns offsets, accumulating the minimum length of
//!    every fixed field, and partitions the fields for store and load.
//!
//! The result only depends on the declared order, so deriving the same
//! declarations twice yields identical offsets.

use crate::field::{FieldDescriptor, MemberIdentifier};
use crate::LodestoreError;
use std::collections::BTreeSet;

/// A declared member that layout derivation can order and assign an offset to.
pub trait LayoutMember {
    fn descriptor(&self) -> &FieldDescriptor;

    fn descriptor_mut(&mut self) -> &mut FieldDescriptor;

    /// Whether load may write this member into an instance.
    fn can_set(&self) -> bool {
        true
    }
}

impl LayoutMember for FieldDescriptor {
    fn descriptor(&self) -> &FieldDescriptor {
        self
    }

    fn descriptor_mut(&mut self) -> &mut FieldDescriptor {
        self
    }
}

/// Field partition of a derived layout. All entries are indices into the
/// reordered member list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldLayout {
    /// Every field, in persisted order.
    pub storing: Vec<usize>,
    /// Fields carrying references of any shape.
    pub references: Vec<usize>,
    /// Settable fields set by `create`.
    pub setting_non_references: Vec<usize>,
    /// Settable fields set by `initialize_state`.
    pub setting_references: Vec<usize>,
    /// The single variable-length field, always last.
    pub trailing_variable: Option<usize>,
    /// Length of the fixed region; offset of the variable field if present.
    pub fixed_length_binary_content: u64,
}

impl FieldLayout {
    /// Check if load may write any member at all.
    #[must_use]
    pub fn has_setting_members(&self) -> bool {
        !self.setting_non_references.is_empty() || !self.setting_references.is_empty()
    }
}

/// Derive the layout of `members` in place.
///
/// On success the variable-length field (if any) is last and every
/// descriptor has its offset set.
pub fn derive_layout<M: LayoutMember>(
    type_name: &str,
    members: &mut Vec<M>,
) -> Result<FieldLayout, LodestoreError> {
    let mut seen: BTreeSet<&MemberIdentifier> = BTreeSet::new();
    for member in members.iter() {
        let identifier = &member.descriptor().identifier;
        if identifier.name.is_empty() {
            return Err(LodestoreError::UnnamedField {
                type_name: type_name.to_string(),
            });
        }
        if !seen.insert(identifier) {
            return Err(LodestoreError::DuplicateField(identifier.to_string()));
        }
    }

    let variable: Vec<usize> = members
        .iter()
        .enumerate()
        .filter(|(_, m)| m.descriptor().kind.is_variable_length())
        .map(|(i, _)| i)
        .collect();
    match variable.as_slice() {
        [] => {}
        [single] => {
            let member = members.remove(*single);
            members.push(member);
        }
        [first, second, ..] => {
            return Err(LodestoreError::MultipleVariableLengthFields {
                first: members[*first].descriptor().identifier.to_string(),
                second: members[*second].descriptor().identifier.to_string(),
            });
        }
    }

    let mut layout = FieldLayout::default();
    let mut offset: u64 = 0;
    for (index, member) in members.iter_mut().enumerate() {
        member.descriptor_mut().initialize_offset(offset)?;

        let kind = member.descriptor().kind;
        layout.storing.push(index);
        if kind.has_references() {
            layout.references.push(index);
        }
        if member.can_set() {
            if kind.has_references() {
                layout.setting_references.push(index);
            } else {
                layout.setting_non_references.push(index);
            }
        }
        if kind.is_variable_length() {
            layout.trailing_variable = Some(index);
        } else {
            offset = offset.saturating_add(kind.minimum_length());
        }
    }
    layout.fixed_length_binary_content = offset;

    tracing::trace!(
        type_name,
        fields = layout.storing.len(),
        fixed = layout.fixed_length_binary_content,
        "derived layout"
    );
    Ok(layout)
}

// =============================================================================
// TESTS
// =============================================================================
