//! # Storage Backends
//!
//! Durable homes for entity records and the type dictionary.

mod redb_store;

pub use redb_store::RedbEntityStore;
