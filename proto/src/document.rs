use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::id::AttemptId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
            OperationKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// A GraphQL document, reduced to what the offline layer needs to know about it.
///
/// Parsing and validation belong to the execution engine. The offline layer only routes on the
/// operation kind, looks update functions up by operation name, and uses the root field names to
/// address the cache and to label callback records. `source` is carried verbatim to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub root_fields: Vec<String>,
    pub source: String,
}

impl Document {
    pub fn new(kind: OperationKind, name: Option<&str>, root_fields: &[&str], source: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.map(str::to_owned),
            root_fields: root_fields.iter().map(|f| (*f).to_owned()).collect(),
            source: source.into(),
        }
    }

    pub fn query(name: &str, root_fields: &[&str], source: impl Into<String>) -> Self {
        Self::new(OperationKind::Query, Some(name), root_fields, source)
    }

    pub fn mutation(name: &str, root_fields: &[&str], source: impl Into<String>) -> Self {
        Self::new(OperationKind::Mutation, Some(name), root_fields, source)
    }

    pub fn is_mutation(&self) -> bool { self.kind == OperationKind::Mutation }

    pub fn is_query(&self) -> bool { self.kind == OperationKind::Query }

    /// Result key of the first root selection, e.g. `addTodo`.
    pub fn first_root_field(&self) -> Option<&str> { self.root_fields.first().map(String::as_str) }

    /// An object with every root field set to `null`.
    pub fn null_response(&self) -> Value {
        Value::Object(self.root_fields.iter().map(|field| (field.clone(), Value::Null)).collect())
    }
}

/// Per-request context threaded through the link chain.
///
/// `execute` and `attempt_id` are injected by the client on the way in and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    /// Skip offline routing and send straight to the network.
    #[serde(default)]
    pub require_online: bool,
    /// Set when the operation is a replay of an enqueued mutation.
    #[serde(skip)]
    pub execute: bool,
    #[serde(skip)]
    pub attempt_id: Option<AttemptId>,
    /// Caller-owned entries, handed to update-function factories.
    #[serde(default)]
    pub extensions: Map<String, Value>,
}

impl OperationContext {
    pub fn require_online() -> Self { Self { require_online: true, ..Default::default() } }

    pub fn with_extension(mut self, key: &str, value: Value) -> Self {
        self.extensions.insert(key.to_owned(), value);
        self
    }

    /// The persistable part of the context.
    pub fn durable(&self) -> Self { Self { require_online: self.require_online, extensions: self.extensions.clone(), ..Default::default() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub document: Document,
    pub variables: Value,
    #[serde(default)]
    pub context: OperationContext,
}

impl Operation {
    pub fn new(document: Document, variables: Value) -> Self { Self { document, variables, context: OperationContext::default() } }

    pub fn kind(&self) -> OperationKind { self.document.kind }

    /// Operation name used for update-function lookup. Falls back to the first root field for
    /// anonymous documents.
    pub fn name(&self) -> Option<&str> { self.document.name.as_deref().or_else(|| self.document.first_root_field()) }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.document.kind, self.name().unwrap_or("<anonymous>"))
    }
}
