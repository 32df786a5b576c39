//! Data access: collaborator contracts, their in-memory and HTTP implementations and resume persistence.

/// Catalog service contract and in-memory catalog.
pub mod catalog;
/// HTTP clients for the catalog and score services.
#[cfg(feature = "http-services")]
pub mod http;
/// Key-value persistence for resume state.
pub mod kv;
/// Service payloads and their conversions.
pub mod models;
/// Score service contract and in-memory scores.
pub mod scores;
/// Persisted resume snapshots.
pub mod snapshot;
/// Storage error shared by every collaborator.
pub mod storage;
