//! Session lifecycle and reconciliation between push events and the REST API.

mod coordinator;
mod live_store;

pub use coordinator::SyncCoordinator;
