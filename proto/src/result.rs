use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// How a mutation or query interacts with the normalized cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    #[default]
    CacheFirst,
    NetworkOnly,
    CacheOnly,
    /// Results are never written to the cache.
    NoCache,
}

impl FetchPolicy {
    pub fn writes_cache(&self) -> bool { !matches!(self, FetchPolicy::NoCache) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self { Self { message: message.into(), path: Vec::new(), extensions: Map::new() } }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.message) }
}

/// One response from the transport, in GraphQL's wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchResult {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl FetchResult {
    pub fn empty() -> Self { Self::default() }

    pub fn data(data: Value) -> Self { Self { data: Some(data), ..Default::default() } }

    pub fn errors(errors: Vec<GraphQLError>) -> Self { Self { errors, ..Default::default() } }

    pub fn has_errors(&self) -> bool { !self.errors.is_empty() }
}
