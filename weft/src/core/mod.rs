//! Deterministic, pure logic shared by the weft commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod artifacts;
pub mod audit;
pub mod cleanup;
pub mod namespace;
pub mod plan;
