//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - Entity models

mod models;
mod store;

pub use models::*;
pub use store::Store;
