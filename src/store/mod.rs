//! Session state store contract.
//!
//! Every cross-task piece of session state (counters, mailboxes, metric
//! history, timelines) goes through this trait. Each method is a single
//! atomic primitive; callers never rely on multi-call transactions.

mod memory;

pub mod keys;

pub use memory::MemoryStore;

use std::collections::HashMap;

use anyhow::Result;

pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Writes several fields of one hash in a single step.
    fn hset_many(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Adds `delta` to an integer hash field, creating it at zero. Returns the new value.
    fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Adds `delta` to a float hash field, creating it at zero. Returns the new value.
    fn hincr_by_float(&self, key: &str, field: &str, delta: f64) -> Result<f64>;

    /// Appends to a list and trims it to the newest `cap` entries. Returns the new length.
    fn push_bounded(&self, key: &str, value: &str, cap: usize) -> Result<usize>;

    fn list(&self, key: &str) -> Result<Vec<String>>;

    /// Returns true when the key existed.
    fn delete(&self, key: &str) -> Result<bool>;
}
