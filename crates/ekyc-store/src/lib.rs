//! Persistent storage for admitted eKYC registrations.

pub mod sqlite;

pub use sqlite::{SqliteRecordStore, SqliteStoreError};
