//! Shared test utilities for Resonance workspace
//!
//! This crate provides mock implementations of the Resonance server for
//! testing clients without network dependencies.
//!
//! # Mock Services
//!
//! - [`MockSyncServer`] - Mock sync server serving `/v1/sync/state` and
//!   `/v1/sync/events` from an in-memory event log
//! - [`fixtures`] - JSON builders for sync events and snapshots
//!
//! # Example
//!
//! ```rust,ignore
//! use resonance_test_utils::{fixtures, MockSyncServer};
//!
//! #[tokio::test]
//! async fn test_catch_up() {
//!     let server = MockSyncServer::start().await;
//!     server.push_event(fixtures::content_liked("album", "A1"));
//!
//!     // Use server.url() to configure your client
//! }
//! ```

pub mod fixtures;
mod sync;

pub use sync::MockSyncServer;
