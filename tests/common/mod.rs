//! Common test utilities and helpers.
//!
//! This module provides shared functionality for all tests, including:
//! - A recording in-memory document
//! - PDF fixture builders
//! - Assertions over edited documents

#![allow(dead_code)]

pub mod assertions;
pub mod fake;
pub mod fixtures;

pub use assertions::*;
pub use fake::*;
pub use fixtures::*;
