//! Shared test utilities for extrack integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a tracker and runner over an isolated store
//! - Scripted chunk extractors and a recording merger

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::TestHarness;
