//! Common test utilities for session-sync integration tests
//!
//! This module provides shared test infrastructure for integration tests,
//! including playback fixtures, a mock audio engine and an in-process
//! session server that arbitrates between coordinators.

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
