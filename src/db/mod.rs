//! Database module: entity model, store port and the SQLite backend.

mod models;
mod repository;
mod store;

pub use models::*;
pub use repository::*;
pub use store::*;
