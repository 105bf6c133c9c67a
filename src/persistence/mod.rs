//! Persistence layer: adapters for the domain storage ports.
//!
//! [`postgres::PostgresStore`] is the production adapter backed by
//! `sqlx::PgPool`; [`memory::InMemoryStore`] keeps the same contract in
//! process memory for tests and storage-less runs.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
