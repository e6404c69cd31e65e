//! Storage for orders, catalog stock, payments and gateway events.
//!
//! Two implementations share the [`Store`] / [`StoreTx`] traits:
//! - [`PostgresStore`] uses `SELECT ... FOR UPDATE` row locks
//! - [`InMemoryStore`] serializes transactions behind one async mutex

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{Store, StoreTx};
