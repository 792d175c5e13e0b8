//! The error taxonomy for this crate.
//!
//! Each layer of the runtime raises its own error kind so callers can match
//! on the failure mode rather than a type name (spec: distinguishable by
//! kind, not by type). [`SourceError`] is the umbrella returned by the
//! public-facing [`crate::event_store::EventStore`] and
//! [`crate::repository::Repository`] APIs; it wraps the lower layers'
//! errors without erasing them.

use thiserror::Error;

/// Failures from the transcoding registry and the codec pipeline.
///
/// Any step of serialize/compress/encrypt (or their inverses) surfaces one
/// of these; no step swallows an error.
#[derive(Debug, Error, Clone)]
pub enum CodecError {
    /// A value of this Rust type has no registered transcoding.
    #[error("no transcoding registered for type `{0}`")]
    UnregisteredType(&'static str),
    /// A `__type__` name found in a stored payload has no registered transcoding.
    #[error("no transcoding registered for name `{0}`")]
    UnknownTypeName(String),
    /// A stored topic does not resolve to any registered event or aggregate class.
    #[error("unknown topic `{0}`")]
    UnknownTopic(String),
    /// Serialization or deserialization of the structured payload failed.
    #[error("serialization failure: {0}")]
    Serialization(String),
    /// The configured compressor failed to compress or decompress.
    #[error("compression failure: {0}")]
    Compression(String),
    /// The configured cipher failed to encrypt or decrypt.
    #[error("encryption failure: {0}")]
    Encryption(String),
}

/// Failures from an [`crate::store::recorder::AggregateRecorder`] or
/// [`crate::store::notification::ApplicationRecorder`].
#[derive(Debug, Error, Clone)]
pub enum RecorderError {
    /// A uniqueness or ordering constraint was violated on insert. The
    /// whole batch was rolled back; not retryable without resolving the
    /// conflict.
    #[error("integrity violation: (aggregate, version) already recorded")]
    Integrity,
    /// The storage backend failed for reasons unrelated to integrity
    /// (connection refused, disk full, timeout, ...). Callers may retry.
    #[error("operational failure: {0}")]
    Operational(String),
}

/// Failures from replaying events onto an aggregate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// An event's `originator_version` did not equal `aggregate.version() +
    /// 1` at the moment it was applied. Indicates corruption of the stored
    /// stream or concurrent-writer misuse.
    #[error("version error: expected {expected}, got {actual}")]
    Version {
        /// The version the next applied event was required to carry.
        expected: u64,
        /// The version the event actually carried.
        actual: u64,
    },
    /// A command's business-rule validation failed before any event was
    /// constructed. The aggregate and its pending-events buffer are
    /// unchanged.
    #[error("validation error: {0}")]
    Validation(String),
}

/// The umbrella error returned by [`crate::event_store::EventStore`] and
/// [`crate::repository::Repository`].
#[derive(Debug, Error, Clone)]
pub enum SourceError {
    /// Wraps a [`CodecError`].
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Wraps a [`RecorderError`].
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    /// Wraps an [`AggregateError`].
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    /// No snapshot and no events exist for the requested aggregate id.
    #[error("aggregate not found")]
    AggregateNotFound,
}

/// A specialized `Result` type for this crate's fallible operations.
pub type Result<T, E = SourceError> = std::result::Result<T, E>;
