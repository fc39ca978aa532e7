//! Storage backing the in-memory executor
//!
//! - `engine`: ordered byte-level key/value interface
//! - `memory`: `BTreeMap` implementation of it
//! - `keycode`: order-preserving key encoding
//! - `mvcc`: snapshot transactions with commit-time validation

pub mod engine;
pub mod keycode;
pub mod memory;
pub mod mvcc;
