//! Deterministic, pure logic shared by the cleanup engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod aggregate;
pub mod error;
pub mod lifecycle;
pub mod patterns;
pub mod policy;
pub mod template;
pub mod types;
