//! # Formats
//!
//! Pure byte-level encodings. File I/O lives in the app layer.

pub mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, dictionary_from_bytes, dictionary_to_bytes,
};
