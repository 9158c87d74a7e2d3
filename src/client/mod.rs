//! Caller-side helpers
//!
//! [`IndexClient`] speaks the HTTP API; [`IndexIdCache`] keeps the
//! `(indexingKey, network) → indexId` lookups callers need, with explicit
//! invalidation.

pub mod cache;
pub mod error;
pub mod http;

pub use cache::{IndexDirectory, IndexIdCache};
pub use error::ClientError;
pub use http::{IndexClient, IndexClientConfig};
