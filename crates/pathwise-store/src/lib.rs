//! `SQLite` persistence gateway: one JSON snapshot row per developer.

mod error;
pub mod gateway;

pub use error::StoreError;
pub use gateway::SqliteGateway;
