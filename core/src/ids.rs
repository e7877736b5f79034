//! Client-id → server-id reconciliation.
//!
//! When a mutation is queued, every object in its optimistic response whose data id looks locally
//! generated is recorded by *path* (`addTodo`, `addTodo.list`, ...). When the server answers, the
//! same walk over the response yields the server ids at the same paths, and intersecting the two
//! tables gives the substitution map that is applied to everything still queued.
//!
//! All functions here are pure. Substitution returns a fresh value rather than rewriting in place,
//! so an optimistic response shared between several queued effects is never aliased.

use offgrid_proto::IdsMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};

/// Computes the normalized-cache key of an object, e.g. `Todo:42`.
pub type IdGetter = Arc<dyn Fn(&Map<String, Value>) -> Option<String> + Send + Sync>;

/// Decides whether a data id was generated on the client.
pub type ClientIdPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Path (dot separated field names) → id.
pub type IdTable = BTreeMap<String, String>;

static UUID_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").expect("valid uuid pattern"));

/// True if a UUID appears anywhere in `value`, so both `3f2b…` and `Todo:3f2b…` qualify.
pub fn looks_like_uuid(value: &str) -> bool { UUID_SHAPE.is_match(value) }

pub fn default_client_id_predicate() -> ClientIdPredicate { Arc::new(looks_like_uuid) }

/// `__typename:id` (or `__typename:_id`), the conventional normalized-cache key.
pub fn default_data_id_from_object(object: &Map<String, Value>) -> Option<String> {
    let typename = object.get("__typename")?.as_str()?;
    let id = object.get("id").or_else(|| object.get("_id"))?;
    match id {
        Value::String(id) => Some(format!("{typename}:{id}")),
        Value::Number(id) => Some(format!("{typename}:{id}")),
        _ => None,
    }
}

pub fn default_id_getter() -> IdGetter { Arc::new(default_data_id_from_object) }

/// The id part of a data id: everything after the last `:` that has something in front of it.
fn id_part(data_id: &str) -> &str {
    match data_id.rsplit_once(':') {
        Some((prefix, id)) if !prefix.is_empty() && !id.is_empty() => id,
        _ => data_id,
    }
}

/// Walk `value` and record the id of every identifiable object whose data id passes `accept`.
///
/// Only nested objects are descended into. Array elements are never recorded: an id that only
/// lives inside a list has no stable path to match against the server response.
pub fn record_ids(get_id: &IdGetter, value: &Value, accept: &dyn Fn(&str) -> bool) -> IdTable {
    let mut table = IdTable::new();
    collect(get_id, value, "", accept, &mut table);
    table
}

fn collect(get_id: &IdGetter, value: &Value, path: &str, accept: &dyn Fn(&str) -> bool, table: &mut IdTable) {
    let Value::Object(object) = value else { return };

    if let Some(data_id) = get_id(object) {
        if accept(&data_id) {
            table.insert(path.to_owned(), id_part(&data_id).to_owned());
        }
    }

    for (key, child) in object {
        if child.is_object() {
            let child_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
            collect(get_id, child, &child_path, accept, table);
        }
    }
}

/// Client ids in an optimistic response.
pub fn record_client_ids(get_id: &IdGetter, is_client_id: &ClientIdPredicate, value: &Value) -> IdTable {
    record_ids(get_id, value, &|data_id| is_client_id(data_id))
}

/// Intersect two path tables: for every path present in both, map the old id to the new one.
pub fn merge(old_ids: &IdTable, new_ids: &IdTable) -> BTreeMap<String, String> {
    old_ids.iter().filter_map(|(path, old)| new_ids.get(path).map(|new| (old.clone(), new.clone()))).collect()
}

/// Register the client ids of a freshly queued optimistic response. Ids that are already known
/// (possibly already resolved by an earlier mutation) keep their mapping.
pub fn register_client_ids(ids_map: &mut IdsMap, client_ids: &IdTable) {
    for id in client_ids.values() {
        ids_map.entry(id.clone()).or_insert(None);
    }
}

/// Fold the server's answer for `optimistic` into the map. Returns the newly resolved pairs.
///
/// The server response is walked without the client-id filter: server ids rarely look generated,
/// and only paths that held a client id in the optimistic response can match anyway.
pub fn resolve_server_ids(
    ids_map: &mut IdsMap,
    get_id: &IdGetter,
    is_client_id: &ClientIdPredicate,
    optimistic: &Value,
    server: &Value,
) -> BTreeMap<String, String> {
    let old_ids = record_client_ids(get_id, is_client_id, optimistic);
    let new_ids = record_ids(get_id, server, &|_| true);
    let resolved = merge(&old_ids, &new_ids);
    for (client_id, server_id) in &resolved {
        ids_map.insert(client_id.clone(), Some(server_id.clone()));
    }
    resolved
}

/// Deep copy of `value` with every string equal to a resolved client id replaced by its server id.
/// Object fields and array elements are both visited.
pub fn substitute(value: &Value, ids_map: &IdsMap) -> Value {
    match value {
        Value::String(s) => match ids_map.get(s) {
            Some(Some(server_id)) => Value::String(server_id.clone()),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|item| substitute(item, ids_map)).collect()),
        Value::Object(object) => Value::Object(object.iter().map(|(k, v)| (k.clone(), substitute(v, ids_map))).collect()),
        _ => value.clone(),
    }
}
