//! # lodestore
//!
//! Command-line front end of the Lodestore persistence engine.
//!
//! - `cli`: argument parsing and command implementations
//! - `config`: refactoring and similarity tables loaded from TOML

pub mod cli;
pub mod config;
