//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::LodestoreConfig;
use lodestore_core::formats::MAX_PERSISTENCE_PAYLOAD_SIZE;
use lodestore_core::{
    LegacyMemberMapper, LodestoreError, MatchKind, MemberSimilarity, RefactoringResolver, Session,
    TypeDefinition, TypeDictionary, TypeRegistry, TypeResolution, dictionary_from_bytes,
    dictionary_to_bytes,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE VALIDATION
// =============================================================================

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), LodestoreError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| LodestoreError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(LodestoreError::DeserializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and ensure it names a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, LodestoreError> {
    let canonical = path.canonicalize().map_err(|e| {
        LodestoreError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(LodestoreError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path, which must be a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, LodestoreError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        LodestoreError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(LodestoreError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| LodestoreError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read and decode a dictionary file.
pub fn read_dictionary(path: &Path) -> Result<TypeDictionary, LodestoreError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_PERSISTENCE_PAYLOAD_SIZE as u64)?;
    let data = std::fs::read(&validated)
        .map_err(|e| LodestoreError::IoError(format!("Read file: {}", e)))?;
    dictionary_from_bytes(&data)
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open an existing store. The registry starts empty and learns every type
/// from the stored dictionary.
pub fn open_session(db_path: &Path) -> Result<Session, LodestoreError> {
    if !db_path.exists() {
        return Err(LodestoreError::IoError(format!(
            "Store {:?} not found. Run `lodestore init` first.",
            db_path
        )));
    }
    Session::open(db_path, Arc::new(TypeRegistry::new()))
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new store.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), LodestoreError> {
    if db_path.exists() {
        if !force {
            return Err(LodestoreError::IoError(
                "Store already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| LodestoreError::IoError(format!("Remove store: {}", e)))?;
    }

    let mut session = Session::open(db_path, Arc::new(TypeRegistry::new()))?;
    session.save_dictionary()?;
    println!("Initialized new store at {:?}", db_path);

    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show store status.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), LodestoreError> {
    let session = open_session(db_path)?;
    let status = session.status()?;

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "entity_count": status.entity_count,
            "type_count": status.type_count,
            "next_object_id": status.next_object_id,
            "roots": status.roots,
        });
        print_json(&output);
        return Ok(());
    }

    println!("Lodestore Status");
    println!("================");
    println!("Database: {:?}", db_path);
    println!();
    println!("Entities:       {}", status.entity_count);
    println!("Types:          {}", status.type_count);
    println!("Next object id: {}", status.next_object_id);
    println!(
        "Roots:          {}",
        status
            .roots
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(())
}

// =============================================================================
// TYPES COMMAND
// =============================================================================

/// One member of a listed type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub identifier: String,
    pub type_name: String,
    pub offset: Option<u64>,
}

/// One listed type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    pub type_id: u64,
    pub type_name: String,
    pub minimum_length: u64,
    pub maximum_length: u64,
    pub members: Vec<MemberSummary>,
}

impl From<&TypeDefinition> for TypeSummary {
    fn from(definition: &TypeDefinition) -> Self {
        Self {
            type_id: definition.type_id().0,
            type_name: definition.type_name().to_string(),
            minimum_length: definition.members_persisted_length_minimum(),
            maximum_length: definition.members_persisted_length_maximum(),
            members: definition
                .members()
                .iter()
                .map(|member| MemberSummary {
                    identifier: member.identifier.to_string(),
                    type_name: member.type_name.clone(),
                    offset: member.offset(),
                })
                .collect(),
        }
    }
}

/// List the stored types.
pub fn cmd_types(db_path: &Path, json_mode: bool) -> Result<(), LodestoreError> {
    let session = open_session(db_path)?;
    let dictionary = session.registry().dictionary_snapshot()?;
    let types: Vec<TypeSummary> = dictionary.all_types().map(TypeSummary::from).collect();

    if json_mode {
        print_json(&types);
        return Ok(());
    }

    for summary in &types {
        println!(
            "{} {} ({}..={} bytes)",
            summary.type_id, summary.type_name, summary.minimum_length, summary.maximum_length
        );
        for member in &summary.members {
            let offset = member
                .offset
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!("  @{:<6} {} : {}", offset, member.identifier, member.type_name);
        }
    }
    if types.is_empty() {
        println!("No types stored.");
    }

    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Validate every stored record and walk references from the roots.
pub fn cmd_check(db_path: &Path, json_mode: bool) -> Result<(), LodestoreError> {
    let session = open_session(db_path)?;
    let report = session.check()?;

    if json_mode {
        print_json(&report);
    } else {
        println!("Lodestore Check");
        println!("===============");
        println!("Entities:    {}", report.entity_count);
        println!("Reachable:   {}", report.reachable);
        println!("Unreachable: {}", report.unreachable.len());
        for invalid in &report.invalid {
            println!("  invalid {}: {}", invalid.object_id, invalid.error);
        }
        for dangling in &report.dangling {
            println!("  dangling {} -> {}", dangling.from, dangling.to);
        }
        for root in &report.missing_roots {
            println!("  missing root {}", root);
        }
    }

    if !report.is_consistent() {
        return Err(LodestoreError::CorruptRecord(format!(
            "{} invalid records, {} dangling references, {} missing roots",
            report.invalid.len(),
            report.dangling.len(),
            report.missing_roots.len()
        )));
    }
    Ok(())
}

// =============================================================================
// DICTIONARY COMMANDS
// =============================================================================

/// Export the type dictionary.
pub fn cmd_export_dictionary(db_path: &Path, output: &Path) -> Result<(), LodestoreError> {
    let validated_output = validate_output_path(output)?;

    let session = open_session(db_path)?;
    let dictionary = session.registry().dictionary_snapshot()?;
    let data = dictionary_to_bytes(&dictionary)?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| LodestoreError::IoError(format!("Write file: {}", e)))?;

    println!(
        "Exported {} types ({} bytes) to {:?}",
        dictionary.len(),
        data.len(),
        validated_output
    );

    Ok(())
}

/// Merge a dictionary file into the store.
pub fn cmd_import_dictionary(db_path: &Path, input: &Path) -> Result<(), LodestoreError> {
    let dictionary = read_dictionary(input)?;

    let mut session = open_session(db_path)?;
    session.import_dictionary(&dictionary)?;

    println!("Imported {} types", dictionary.len());

    Ok(())
}

// =============================================================================
// SUGGEST COMMAND
// =============================================================================

/// Proposed counterpart of one legacy member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSuggestion {
    pub source: String,
    pub target: Option<String>,
    /// `explicit`, `deleted`, `exact` or `similar`.
    pub kind: &'static str,
    pub score: Option<f64>,
}

/// Proposed mapping of one legacy type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSuggestion {
    pub source_type: String,
    /// Current type the legacy type maps to, if any.
    pub target_type: Option<String>,
    /// `unchanged`, `renamed`, `deleted` or `missing`.
    pub resolution: &'static str,
    pub members: Vec<MemberSuggestion>,
    pub unmatched_sources: Vec<String>,
    pub new_targets: Vec<String>,
}

impl TypeSuggestion {
    fn without_target(source: &TypeDefinition, resolution: &'static str) -> Self {
        Self {
            source_type: source.type_name().to_string(),
            target_type: None,
            resolution,
            members: Vec::new(),
            unmatched_sources: Vec::new(),
            new_targets: Vec::new(),
        }
    }
}

/// Map every legacy type (or only `type_name`) onto the current dictionary.
pub fn suggest_mappings(
    config: &LodestoreConfig,
    legacy: &TypeDictionary,
    current: &TypeDictionary,
    type_name: Option<&str>,
    threshold: Option<f64>,
) -> Result<Vec<TypeSuggestion>, LodestoreError> {
    let resolver = RefactoringResolver::new(config.refactoring_mapping());
    let similarity = MemberSimilarity::new(config.type_similarity());
    let mapper = LegacyMemberMapper::new(&resolver, &similarity)
        .with_threshold(threshold.unwrap_or(config.similarity.threshold));

    let mut suggestions = Vec::new();
    for source in legacy.all_types() {
        if type_name.is_some_and(|name| name != source.type_name()) {
            continue;
        }

        let resolution = match resolver.resolve_type_name(source) {
            TypeResolution::Unchanged => "unchanged",
            TypeResolution::Renamed(_) => "renamed",
            TypeResolution::Deleted => {
                suggestions.push(TypeSuggestion::without_target(source, "deleted"));
                continue;
            }
        };
        let Some(target) = resolver.resolve_current_type(source, |name| current.lookup_by_name(name))?
        else {
            suggestions.push(TypeSuggestion::without_target(source, "missing"));
            continue;
        };

        let result = mapper.map_members(source, target)?;
        suggestions.push(TypeSuggestion {
            source_type: source.type_name().to_string(),
            target_type: Some(target.type_name().to_string()),
            resolution,
            members: result
                .matched
                .iter()
                .map(|m| {
                    let (kind, score) = match m.kind {
                        MatchKind::Explicit => ("explicit", None),
                        MatchKind::Deleted => ("deleted", None),
                        MatchKind::Exact => ("exact", None),
                        MatchKind::Similar(score) => ("similar", Some(score)),
                    };
                    MemberSuggestion {
                        source: m.source.identifier.to_string(),
                        target: m.target.as_ref().map(|t| t.identifier.to_string()),
                        kind,
                        score,
                    }
                })
                .collect(),
            unmatched_sources: result
                .unmatched_sources
                .iter()
                .map(|m| m.identifier.to_string())
                .collect(),
            new_targets: result
                .new_targets
                .iter()
                .map(|m| m.identifier.to_string())
                .collect(),
        });
    }
    Ok(suggestions)
}

/// Suggest member mappings between two dictionary files.
pub fn cmd_suggest(
    config_path: &Path,
    from: &Path,
    to: &Path,
    type_name: Option<&str>,
    threshold: Option<f64>,
    json_mode: bool,
) -> Result<(), LodestoreError> {
    let config = LodestoreConfig::load(config_path)?;
    let legacy = read_dictionary(from)?;
    let current = read_dictionary(to)?;
    let suggestions = suggest_mappings(&config, &legacy, &current, type_name, threshold)?;

    if json_mode {
        print_json(&suggestions);
        return Ok(());
    }

    for suggestion in &suggestions {
        match &suggestion.target_type {
            Some(target) => println!(
                "{} -> {} ({})",
                suggestion.source_type, target, suggestion.resolution
            ),
            None => println!("{} ({})", suggestion.source_type, suggestion.resolution),
        }
        for member in &suggestion.members {
            let target = member.target.as_deref().unwrap_or("<deleted>");
            match member.score {
                Some(score) => println!(
                    "  {} -> {} [{} {:.3}]",
                    member.source, target, member.kind, score
                ),
                None => println!("  {} -> {} [{}]", member.source, target, member.kind),
            }
        }
        for source in &suggestion.unmatched_sources {
            println!("  {} -> ? [unmatched]", source);
        }
        for target in &suggestion.new_targets {
            println!("  ? -> {} [new]", target);
        }
    }
    if suggestions.is_empty() {
        println!("No legacy types to map.");
    }

    Ok(())
}
