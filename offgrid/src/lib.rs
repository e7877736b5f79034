//! # Offgrid
//!
//! An offline layer for GraphQL clients. Mutations issued while the network is down are queued,
//! applied to the normalized cache optimistically and replayed in order once connectivity returns.
//! Ids generated on the client are swapped for the ids the server assigns, in the cache and in
//! every mutation still waiting to be sent.
//!
//! ## Core Concepts
//!
//! - **Outbox**: the ordered queue of mutations that have not been confirmed yet
//! - **Identifier map**: client-generated id to server id, filled in as confirmations arrive
//! - **Snapshot**: the cache as it was before the current batch of mutations, replayed onto after
//!   every confirmation
//! - **Link**: one handler in the request chain; the transport is the last one
//!
//! ## Example
//!
//! ```rust
//! use offgrid::{async_trait, json, Document, FetchResult, Link, LinkError, MutationOptions, NextLink, OfflineClient, OfflineClientOptions, Operation, Response};
//! use std::sync::Arc;
//!
//! struct Server;
//!
//! #[async_trait]
//! impl Link for Server {
//!     async fn request(&self, _operation: Operation, _forward: NextLink) -> Result<Response, LinkError> {
//!         Ok(FetchResult::data(json!({"addTodo": {"__typename": "Todo", "id": "42", "title": "Take out trash"}})).into())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = OfflineClientOptions::new(Arc::new(Server));
//! options.network.set_online(false);
//! let client = OfflineClient::new(options).await?;
//! client.hydrated().await;
//!
//! let add_todo = Document::mutation("AddTodo", &["addTodo"], "mutation AddTodo($title: String!) { addTodo(title: $title) { id title } }");
//! let response = client
//!     .mutate(
//!         MutationOptions::new(add_todo)
//!             .variables(json!({"title": "Take out trash"}))
//!             .optimistic(json!({"addTodo": {"__typename": "Todo", "id": "8c5c6f9e-3b0e-4f4e-9d36-2f0f1e6d2a11", "title": "Take out trash"}})),
//!     )
//!     .await?;
//! assert!(response.is_optimistic());
//!
//! client.set_online(true);
//! client.drained().await;
//! assert!(client.cache().read_record("Todo:42").is_some());
//! # client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub use offgrid_core::*;
pub use offgrid_proto::{
    AttemptId, CacheSnapshot, Document, EnqueuedEffect, FetchPolicy, FetchResult, GraphQLError, IdsMap, MetadataState, Operation,
    OperationContext, OperationKind, PersistedState,
};

pub use async_trait::async_trait;
pub use serde_json::{json, Value};

#[cfg(feature = "sled")]
pub use offgrid_storage_sled::SledStorage;
