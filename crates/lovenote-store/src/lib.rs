//! LoveNote persistence
//!
//! Two implementations of [`lovenote_core::Store`]:
//! - [`PgStore`]: PostgreSQL via sqlx, with embedded migrations
//! - [`MemoryStore`]: in-process, for tests and local demos

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;
