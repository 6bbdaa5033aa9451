//! Shared test utilities for gau integration tests.

pub mod harness;

pub use harness::*;
