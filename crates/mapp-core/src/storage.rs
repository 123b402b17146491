//! Abstract storage contract.
//!
//! The core never sees SQL. Records flow in and out keyed by snake field
//! name; the concrete adapter owns table layout, connections and
//! transactions. Transactional boundaries are at most one call wide.

use crate::error::MappError;
use crate::value::{Record, Value};

pub trait Storage: Send + Sync {
    /// Insert a record, assigning a fresh id. Returns the stored record
    /// (with `id`).
    fn insert(&self, table: &str, record: &Record) -> Result<Record, MappError>;

    fn get(&self, table: &str, id: &str) -> Result<Option<Record>, MappError>;

    /// Full-record update. `NotFound` when the id does not exist.
    fn update(&self, table: &str, id: &str, record: &Record) -> Result<Record, MappError>;

    /// Idempotent: deleting a missing id succeeds.
    fn delete(&self, table: &str, id: &str) -> Result<(), MappError>;

    /// Page of records in insertion order plus the total count.
    fn list(&self, table: &str, offset: u64, limit: u64) -> Result<(Vec<Record>, u64), MappError>;

    fn count_by(&self, table: &str, field: &str, value: &Value) -> Result<u64, MappError>;

    fn find_by(&self, table: &str, field: &str, value: &Value)
        -> Result<Option<Record>, MappError>;
}
