//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{coordinator, test_session, TestServer};
//!
//! #[tokio::test]
//! async fn test_fetch() {
//!     let server = TestServer::spawn().await;
//!     let sync = coordinator(&server);
//!
//!     sync.start(&test_session()).await.unwrap();
//!     sync.fetch().await.unwrap();
//!     assert_eq!(sync.stats().total, 3);
//! }
//! ```

mod client;
mod fixtures;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{
    coordinator, coordinator_with, other_session, record_events, start_synced, test_session,
    test_settings,
    wait_until,
};
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{pushed_notification, seed_notifications};
pub use server::TestServer;
