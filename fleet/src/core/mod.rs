//! Deterministic, pure logic shared by the tournament.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod evaluation;
pub mod feedback;
pub mod naming;
pub mod plan;
pub mod scoring;
pub mod types;
