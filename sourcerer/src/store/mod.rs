//! Storage backends.
//!
//! Every backend implements [`recorder::AggregateRecorder`], and the main
//! event stream's backend additionally implements
//! [`notification::ApplicationRecorder`]. A snapshot stream reuses the same
//! recorder type as the main stream, pointed at its own table/tree/map.

/// The aggregate-agnostic storage contract and its shared types.
pub mod recorder;

/// The process-wide notification log contract.
pub mod notification;

#[cfg(feature = "in-memory")]
/// In-memory recorders.
pub mod in_memory;

#[cfg(feature = "sled-storage")]
/// Persistent recorders using `sled`.
pub mod sled;

#[cfg(feature = "postgres-storage")]
/// Persistent recorders using PostgreSQL via `sqlx`.
pub mod sqlx_postgres;
