//! core
//!
//! Core domain types, schemas, and operations for flatweave.
//!
//! # Modules
//!
//! - [`types`] - Strong types: Address, Segment, Index
//! - [`value`] - Leaf values and their flat expansion
//! - [`template`] - Immutable schema tree and web-template parsing
//! - [`composition`] - Mutable document tree, defaults and flattening
//! - [`config`] - Mapping configuration schema and loading
//! - [`pattern`] - Handlebars value patterns for mapping configs
//!
//! # Design Principles
//!
//! - Addresses are parsed once into strong types
//! - Templates are immutable and outlive every composition built on them
//! - Flattening is deterministic: keys are sorted, document order decides
//!   repetition indices

pub mod composition;
pub mod config;
pub mod pattern;
pub mod template;
pub mod types;
pub mod value;
