//! User notifications module

mod models;
pub mod query;
mod stats;
mod store;

pub use models::{Notification, NotificationCategory, NotificationPage};
pub use stats::{compute_stats, NotificationStats};
pub use store::{NotificationStore, StoreSnapshot};
