#![forbid(unsafe_code)]

//! SQLite-backed outline store.

mod store;

pub use store::{SqliteStore, SqliteTx, StoreError, StoreOptions};
