//! # Member Similarity
//!
//! Advisory scores in `[0, 1]` used to suggest mappings for legacy members
//! that have no explicit refactoring entry. A score never overrides an
//! explicit entry.
//!
//! ```text
//! score = (name_similarity * qualifier_factor + type_similarity) / 2
//! ```
//!
//! - name similarity: normalized Levenshtein over the local member names
//! - qualifier factor: 1.0 if both qualifiers are equal (or both absent),
//!   0.5 otherwise
//! - type similarity: 1.0 for identical type names, else the table value,
//!   else 0.0

#![allow(clippy::float_arithmetic)]

use super::RefactoringResolver;
use crate::LodestoreError;
use crate::definition::TypeDefinition;
use crate::field::FieldDescriptor;
use crate::primitives::DEFAULT_SIMILARITY_THRESHOLD;
use std::collections::{BTreeMap, BTreeSet};

fn clamp_unit(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

// =============================================================================
// TYPE SIMILARITY TABLE
// =============================================================================

/// Symmetric table of pairwise type similarities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeSimilarity {
    scores: BTreeMap<(String, String), f64>,
}

impl TypeSimilarity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    /// Record the similarity of two types. Scores are clamped to `[0, 1]`;
    /// NaN is stored as 0.
    pub fn insert(&mut self, a: &str, b: &str, score: f64) {
        self.scores.insert(Self::key(a, b), clamp_unit(score));
    }

    /// Table value for a pair of types, in either order.
    #[must_use]
    pub fn lookup(&self, a: &str, b: &str) -> Option<f64> {
        self.scores.get(&Self::key(a, b)).copied()
    }

    /// 1.0 for identical types, else the table value, else 0.0.
    #[must_use]
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        self.lookup(a, b).unwrap_or(0.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

// =============================================================================
// MEMBER SCORER
// =============================================================================

/// Scores how likely a legacy member corresponds to a current member.
#[derive(Debug, Clone, Default)]
pub struct MemberSimilarity {
    types: TypeSimilarity,
}

impl MemberSimilarity {
    #[must_use]
    pub fn new(types: TypeSimilarity) -> Self {
        Self { types }
    }

    /// Combined score of `source` against `target`, always within `[0, 1]`.
    #[must_use]
    pub fn evaluate(&self, source: &FieldDescriptor, target: &FieldDescriptor) -> f64 {
        let name = self.name_similarity(source, target);
        let kind = self.types.similarity(&source.type_name, &target.type_name);
        clamp_unit((name + kind) / 2.0)
    }

    fn name_similarity(&self, source: &FieldDescriptor, target: &FieldDescriptor) -> f64 {
        // Equal qualifiers are not short-circuited: a renamed qualifier must
        // still score below an unchanged one.
        let raw = strsim::normalized_levenshtein(&source.identifier.name, &target.identifier.name);
        let factor = if source.identifier.qualifier == target.identifier.qualifier {
            1.0
        } else {
            0.5
        };
        raw * factor
    }
}

// =============================================================================
// LEGACY MEMBER MAPPING
// =============================================================================

/// How a legacy member was matched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    /// Explicit refactoring entry.
    Explicit,
    /// Explicit deletion entry.
    Deleted,
    /// Identical identifier in the current type.
    Exact,
    /// Best similarity score above the threshold.
    Similar(f64),
}

/// One legacy member and its counterpart, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberMatch {
    pub source: FieldDescriptor,
    pub target: Option<FieldDescriptor>,
    pub kind: MatchKind,
}

/// Complete member mapping between a legacy and a current type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberMappingResult {
    /// Matched members, in legacy layout order.
    pub matched: Vec<MemberMatch>,
    /// Legacy members without counterpart.
    pub unmatched_sources: Vec<FieldDescriptor>,
    /// Current members no legacy member maps to.
    pub new_targets: Vec<FieldDescriptor>,
}

/// Maps every member of a legacy type onto a current type.
///
/// Explicit entries are applied first, then exact identifier matches, then
/// the best remaining pairs by similarity.
#[derive(Debug, Clone, Copy)]
pub struct LegacyMemberMapper<'a> {
    resolver: &'a RefactoringResolver,
    similarity: &'a MemberSimilarity,
    threshold: f64,
}

impl<'a> LegacyMemberMapper<'a> {
    #[must_use]
    pub fn new(resolver: &'a RefactoringResolver, similarity: &'a MemberSimilarity) -> Self {
        Self {
            resolver,
            similarity,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Minimum score for a similarity match (clamped to `[0, 1]`).
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = clamp_unit(threshold);
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &'a RefactoringResolver {
        self.resolver
    }

    pub fn map_members(
        &self,
        source: &TypeDefinition,
        target: &TypeDefinition,
    ) -> Result<MemberMappingResult, LodestoreError> {
        let sources = source.members();
        let targets = target.members();
        let mut matched: Vec<(usize, MemberMatch)> = Vec::new();
        let mut taken_sources = BTreeSet::new();
        let mut taken_targets = BTreeSet::new();

        for (i, member) in sources.iter().enumerate() {
            let Some(mapping) = self.resolver.resolve_member(source, member, target)? else {
                continue;
            };
            let kind = match &mapping.target {
                Some(mapped) => {
                    if let Some(j) = targets.iter().position(|t| t == mapped) {
                        taken_targets.insert(j);
                    }
                    MatchKind::Explicit
                }
                None => MatchKind::Deleted,
            };
            taken_sources.insert(i);
            matched.push((
                i,
                MemberMatch {
                    source: mapping.source,
                    target: mapping.target,
                    kind,
                },
            ));
        }

        for (i, member) in sources.iter().enumerate() {
            if taken_sources.contains(&i) {
                continue;
            }
            let exact = targets
                .iter()
                .enumerate()
                .find(|(j, t)| !taken_targets.contains(j) && t.identifier == member.identifier);
            if let Some((j, t)) = exact {
                taken_sources.insert(i);
                taken_targets.insert(j);
                matched.push((
                    i,
                    MemberMatch {
                        source: member.clone(),
                        target: Some(t.clone()),
                        kind: MatchKind::Exact,
                    },
                ));
            }
        }

        let mut candidates = Vec::new();
        for (i, member) in sources.iter().enumerate() {
            if taken_sources.contains(&i) {
                continue;
            }
            for (j, t) in targets.iter().enumerate() {
                if taken_targets.contains(&j) {
                    continue;
                }
                let score = self.similarity.evaluate(member, t);
                if score >= self.threshold {
                    candidates.push((score, i, j));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        for (score, i, j) in candidates {
            if taken_sources.contains(&i) || taken_targets.contains(&j) {
                continue;
            }
            taken_sources.insert(i);
            taken_targets.insert(j);
            matched.push((
                i,
                MemberMatch {
                    source: sources[i].clone(),
                    target: Some(targets[j].clone()),
                    kind: MatchKind::Similar(score),
                },
            ));
        }

        matched.sort_by_key(|(i, _)| *i);
        let result = MemberMappingResult {
            matched: matched.into_iter().map(|(_, m)| m).collect(),
            unmatched_sources: sources
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken_sources.contains(i))
                .map(|(_, m)| m.clone())
                .collect(),
            new_targets: targets
                .iter()
                .enumerate()
                .filter(|(j, _)| !taken_targets.contains(j))
                .map(|(_, m)| m.clone())
                .collect(),
        };
        tracing::debug!(
            source = source.type_name(),
            target = target.type_name(),
            matched = result.matched.len(),
            unmatched = result.unmatched_sources.len(),
            "mapped legacy members"
        );
        Ok(result)
    }
}

// =============================================================================
// TESTS
// =============================================================================
