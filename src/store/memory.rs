use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
};

use anyhow::{anyhow, bail, Result};

use super::StateStore;

enum Entry {
    Value(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Value(_) => "string",
            Entry::Hash(_) => "hash",
            Entry::List(_) => "list",
        }
    }
}

/// In-process store. One lock guards the whole keyspace, so every trait
/// method is atomic with respect to every other.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn wrong_type(key: &str, entry: &Entry, wanted: &str) -> anyhow::Error {
    anyhow!(
        "WRONGTYPE key '{key}' holds a {} value, expected {wanted}",
        entry.kind()
    )
}

fn hash_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<&'a mut HashMap<String, String>> {
    let entry = entries
        .entry(key.to_string())
        .or_insert_with(|| Entry::Hash(HashMap::new()));
    match entry {
        Entry::Hash(hash) => Ok(hash),
        other => Err(wrong_type(key, other, "hash")),
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entries().get(key) {
            None => Ok(None),
            Some(Entry::Value(value)) => Ok(Some(value.clone())),
            Some(other) => Err(wrong_type(key, other, "string")),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()
            .insert(key.to_string(), Entry::Value(value.to_string()));
        Ok(())
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        match self.entries().get(key) {
            None => Ok(None),
            Some(Entry::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(other) => Err(wrong_type(key, other, "hash")),
        }
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut entries = self.entries();
        hash_mut(&mut entries, key)?.insert(field.to_string(), value.to_string());
        Ok(())
    }

    fn hset_many(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut entries = self.entries();
        let hash = hash_mut(&mut entries, key)?;
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        match self.entries().get(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(hash)) => Ok(hash.clone()),
            Some(other) => Err(wrong_type(key, other, "hash")),
        }
    }

    fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut entries = self.entries();
        let hash = hash_mut(&mut entries, key)?;
        let current = match hash.get(field) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| anyhow!("hash field '{key}.{field}' is not an integer: {raw}"))?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| anyhow!("increment on '{key}.{field}' overflows"))?;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn hincr_by_float(&self, key: &str, field: &str, delta: f64) -> Result<f64> {
        if !delta.is_finite() {
            bail!("increment on '{key}.{field}' is not a finite number");
        }
        let mut entries = self.entries();
        let hash = hash_mut(&mut entries, key)?;
        let current = match hash.get(field) {
            Some(raw) => raw
                .parse::<f64>()
                .map_err(|_| anyhow!("hash field '{key}.{field}' is not a float: {raw}"))?,
            None => 0.0,
        };
        let next = current + delta;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    fn push_bounded(&self, key: &str, value: &str, cap: usize) -> Result<usize> {
        let mut entries = self.entries();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()));
        let list = match entry {
            Entry::List(list) => list,
            other => return Err(wrong_type(key, other, "list")),
        };
        list.push_back(value.to_string());
        while list.len() > cap {
            list.pop_front();
        }
        Ok(list.len())
    }

    fn list(&self, key: &str) -> Result<Vec<String>> {
        match self.entries().get(key) {
            None => Ok(Vec::new()),
            Some(Entry::List(list)) => Ok(list.iter().cloned().collect()),
            Some(other) => Err(wrong_type(key, other, "list")),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries().remove(key).is_some())
    }
}
