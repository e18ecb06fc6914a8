//! rampart-config: Configuration structures and parsing for rampart
//!
//! This crate provides the declarative half of the filter: the policy
//! file format, its serde representation, and load-time validation.

pub mod config;

pub use config::*;
