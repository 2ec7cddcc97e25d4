pub mod db;
pub mod models;
pub mod repositories;
pub mod store;

pub use sqlx;
pub use store::memory::MemoryLedgerStore;
pub use store::postgres::PgLedgerStore;
pub use store::{LedgerStore, StoreError, StoreResult};
