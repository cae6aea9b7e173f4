//! flatweave - Template-driven clinical composition builder
//!
//! flatweave binds a mutable composition tree node-for-node to an immutable
//! clinical template, lets callers assign values by slash-separated address
//! (creating intermediate nodes on demand), fills required fields from
//! template defaults, and serializes the result to a flat `address -> text`
//! map.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Build pipeline: facts + mapping config -> composition
//! - [`core`] - Addresses, values, templates, compositions and config
//! - [`source`] - Ordered fact streams from source documents
//!
//! # Correctness Invariants
//!
//! 1. Every composition node is bound to the template node at its address
//! 2. Repetition indices are assigned once, in creation order, and never reused
//! 3. Only leaves carry values
//! 4. Flattening fails loudly rather than emitting a leaf with no value

pub mod cli;
pub mod core;
pub mod engine;
pub mod source;
