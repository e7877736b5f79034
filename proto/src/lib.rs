//! Durable data model shared by the offgrid crates.
//!
//! Everything in here is plain data: it can be serialized into the key-value store that backs the
//! outbox, and nothing here performs I/O.

pub mod document;
pub mod effect;
pub mod error;
pub mod id;
pub mod result;
pub mod state;

pub use document::*;
pub use effect::*;
pub use error::*;
pub use id::*;
pub use result::*;
pub use state::*;

/// Re-exported so downstream crates build values with the same JSON type.
pub use serde_json::{json, Map, Value};
