//! Storage adapters implementing the unit-of-work ports.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryStore, InMemoryUnitOfWork};
pub use postgres::{PgUnitOfWork, PostgresStore};
