//! The normalized cache collaborator and an in-memory implementation of it.

use offgrid_proto::{CacheSnapshot, Document, OperationKind};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, HashSet},
    sync::RwLock,
};
use tokio::sync::watch;
use tracing::debug;

use crate::{
    error::CacheError,
    ids::{default_id_getter, IdGetter},
};

pub const ROOT_QUERY: &str = "ROOT_QUERY";
pub const ROOT_MUTATION: &str = "ROOT_MUTATION";
pub const ROOT_SUBSCRIPTION: &str = "ROOT_SUBSCRIPTION";

/// Key of a reference from one record to another.
pub const REF_KEY: &str = "__ref";

pub fn root_id(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Query => ROOT_QUERY,
        OperationKind::Mutation => ROOT_MUTATION,
        OperationKind::Subscription => ROOT_SUBSCRIPTION,
    }
}

pub fn reference(data_id: &str) -> Value {
    let mut object = Map::new();
    object.insert(REF_KEY.to_owned(), Value::String(data_id.to_owned()));
    Value::Object(object)
}

fn as_reference(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(REF_KEY)?.as_str()
}

/// A normalized store of records keyed by data id.
///
/// Writes never notify watchers by themselves. Whoever writes decides when the batch is complete
/// and calls [`NormalizedCache::broadcast`].
pub trait NormalizedCache: Send + Sync {
    fn extract(&self) -> CacheSnapshot;

    /// Replace the entire contents.
    fn restore(&self, snapshot: CacheSnapshot);

    /// Write an operation result. `data` must be an object keyed by root field.
    fn write(&self, document: &Document, variables: &Value, data: &Value) -> Result<(), CacheError>;

    /// Read an operation's root fields back out, following references.
    fn read(&self, document: &Document, variables: &Value) -> Result<Value, CacheError>;

    fn read_record(&self, data_id: &str) -> Option<Value>;

    fn write_record(&self, data_id: &str, record: Value);

    /// Data id of an object as this cache would normalize it.
    fn identify(&self, object: &Value) -> Option<String>;

    fn reset(&self);

    fn broadcast(&self);

    /// Generation counter, bumped on every broadcast.
    fn subscribe(&self) -> watch::Receiver<u64>;

    /// Read-modify-write of a single record. A missing record starts out empty.
    fn modify_record(&self, data_id: &str, f: &mut dyn FnMut(&mut Map<String, Value>)) {
        let mut record = match self.read_record(data_id) {
            Some(Value::Object(object)) => object,
            _ => Map::new(),
        };
        f(&mut record);
        self.write_record(data_id, Value::Object(record));
    }
}

#[derive(Clone)]
pub struct CacheOptions {
    pub data_id_from_object: IdGetter,
    /// Keep the `ROOT_MUTATION` record around after mutation results are written.
    pub store_root_mutation: bool,
}

impl Default for CacheOptions {
    fn default() -> Self { Self { data_id_from_object: default_id_getter(), store_root_mutation: false } }
}

impl std::fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheOptions").field("store_root_mutation", &self.store_root_mutation).finish_non_exhaustive()
    }
}

pub struct InMemoryCache {
    records: RwLock<BTreeMap<String, Value>>,
    options: CacheOptions,
    generation: watch::Sender<u64>,
}

impl InMemoryCache {
    pub fn new(options: CacheOptions) -> Self {
        let (generation, _) = watch::channel(0);
        Self { records: RwLock::new(BTreeMap::new()), options, generation }
    }

    pub fn options(&self) -> &CacheOptions { &self.options }

    pub fn len(&self) -> usize { self.records.read().expect("Failed to lock the cache").len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn contains(&self, data_id: &str) -> bool { self.records.read().expect("Failed to lock the cache").contains_key(data_id) }

    fn normalize(&self, records: &mut BTreeMap<String, Value>, value: &Value) -> Value {
        match value {
            Value::Object(object) => {
                let fields: Map<String, Value> = object.iter().map(|(k, v)| (k.clone(), self.normalize(records, v))).collect();
                match (self.options.data_id_from_object)(object) {
                    Some(data_id) => {
                        merge_fields(records, &data_id, fields);
                        reference(&data_id)
                    }
                    None => Value::Object(fields),
                }
            }
            Value::Array(items) => Value::Array(items.iter().map(|item| self.normalize(records, item)).collect()),
            _ => value.clone(),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self { Self::new(CacheOptions::default()) }
}

fn merge_fields(records: &mut BTreeMap<String, Value>, data_id: &str, fields: Map<String, Value>) {
    match records.entry(data_id.to_owned()).or_insert_with(|| Value::Object(Map::new())) {
        Value::Object(existing) => existing.extend(fields),
        other => *other = Value::Object(fields),
    }
}

fn denormalize(records: &BTreeMap<String, Value>, value: &Value, visiting: &mut HashSet<String>) -> Result<Value, CacheError> {
    if let Some(data_id) = as_reference(value) {
        if visiting.contains(data_id) {
            // cyclic graph, leave the reference in place
            return Ok(value.clone());
        }
        let record = records.get(data_id).ok_or_else(|| CacheError::Miss(format!("dangling reference to {data_id}")))?;
        visiting.insert(data_id.to_owned());
        let resolved = denormalize(records, record, visiting);
        visiting.remove(data_id);
        return resolved;
    }

    match value {
        Value::Object(object) => {
            let mut resolved = Map::with_capacity(object.len());
            for (key, field) in object {
                resolved.insert(key.clone(), denormalize(records, field, visiting)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => Ok(Value::Array(items.iter().map(|item| denormalize(records, item, visiting)).collect::<Result<_, _>>()?)),
        _ => Ok(value.clone()),
    }
}

impl NormalizedCache for InMemoryCache {
    fn extract(&self) -> CacheSnapshot { CacheSnapshot(self.records.read().expect("Failed to lock the cache").clone()) }

    fn restore(&self, snapshot: CacheSnapshot) { *self.records.write().expect("Failed to lock the cache") = snapshot.0; }

    fn write(&self, document: &Document, _variables: &Value, data: &Value) -> Result<(), CacheError> {
        let Value::Object(fields) = data else {
            return Err(CacheError::InvalidWrite(format!("{} result is not an object", document.kind)));
        };

        let root = root_id(document.kind);
        let mut records = self.records.write().expect("Failed to lock the cache");
        let normalized: Map<String, Value> = fields.iter().map(|(k, v)| (k.clone(), self.normalize(&mut records, v))).collect();
        merge_fields(&mut records, root, normalized);

        if document.is_mutation() && !self.options.store_root_mutation {
            records.remove(ROOT_MUTATION);
        }
        debug!("InMemoryCache wrote {} root field(s) of {}", fields.len(), document.kind);
        Ok(())
    }

    fn read(&self, document: &Document, _variables: &Value) -> Result<Value, CacheError> {
        let records = self.records.read().expect("Failed to lock the cache");
        let root = root_id(document.kind);
        let root_record = records.get(root).and_then(Value::as_object).ok_or_else(|| CacheError::Miss(format!("no {root} record")))?;

        let mut visiting = HashSet::new();
        let mut data = Map::new();
        for field in &document.root_fields {
            let value = root_record.get(field).ok_or_else(|| CacheError::Miss(format!("{root}.{field}")))?;
            data.insert(field.clone(), denormalize(&records, value, &mut visiting)?);
        }
        Ok(Value::Object(data))
    }

    fn read_record(&self, data_id: &str) -> Option<Value> { self.records.read().expect("Failed to lock the cache").get(data_id).cloned() }

    fn write_record(&self, data_id: &str, record: Value) {
        self.records.write().expect("Failed to lock the cache").insert(data_id.to_owned(), record);
    }

    fn identify(&self, object: &Value) -> Option<String> { object.as_object().and_then(|o| (self.options.data_id_from_object)(o)) }

    fn reset(&self) { self.records.write().expect("Failed to lock the cache").clear(); }

    fn broadcast(&self) { self.generation.send_modify(|generation| *generation += 1); }

    fn subscribe(&self) -> watch::Receiver<u64> { self.generation.subscribe() }
}
