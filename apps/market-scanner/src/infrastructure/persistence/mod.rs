//! Persistence Adapters
//!
//! Implementations of the [`TickerStore`](crate::application::ports::TickerStore)
//! and [`CredentialStore`](crate::application::ports::CredentialStore) ports.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
