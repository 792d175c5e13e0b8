//! Stable string names for event and aggregate classes, and a registry that
//! resolves a stored topic back to a constructor on read.
//!
//! This replaces the dynamic module-path-plus-attribute-chain resolution of
//! the system this crate is modelled on: instead of walking an interpreter's
//! module table at run time, each event or aggregate class registers a
//! decoder function under a stable string up front, and decoding looks it
//! up in a plain map.

use std::any::Any;
use std::fmt;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::CodecError;

/// A stable, reversible name for an event or aggregate class.
///
/// Topics are opaque to callers beyond their string form, but by convention
/// this crate's derive macro emits topics shaped
/// `"<crate>::<module>::<Type>::<Variant>"`, which is deterministic given
/// the class and stable across processes sharing the same binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic(pub &'static str);

impl Topic {
    /// Returns the topic as a plain string slice.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl From<&'static str> for Topic {
    fn from(value: &'static str) -> Self {
        Self(value)
    }
}

type Decoder = Box<dyn Fn(Value) -> Result<Box<dyn Any + Send>, CodecError> + Send + Sync>;

/// A registry mapping topics to the constructors they name.
///
/// Unknown topics fail cleanly with [`CodecError::UnknownTopic`], matching
/// the requirement that a mismatch between a stored topic and any known
/// class is a codec error rather than a panic.
#[derive(Default)]
pub struct TopicRegistry {
    decoders: DashMap<&'static str, Decoder>,
}

impl TopicRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a decoder for `topic`. Re-registering the same topic
    /// replaces the previous decoder, mirroring the replace-on-duplicate
    /// behaviour of the transcoding registry (module A).
    pub fn register<T, F>(&self, topic: Topic, decode: F)
    where
        T: Send + 'static,
        F: Fn(Value) -> Result<T, CodecError> + Send + Sync + 'static,
    {
        let boxed: Decoder = Box::new(move |value| {
            decode(value).map(|v| Box::new(v) as Box<dyn Any + Send>)
        });
        self.decoders.insert(topic.as_str(), boxed);
    }

    /// Decodes `payload` using the constructor registered under `topic`,
    /// downcasting it to `T`.
    ///
    /// # Errors
    /// Returns [`CodecError::UnknownTopic`] if no decoder is registered for
    /// `topic`, or [`CodecError::Serialization`] if the registered decoder's
    /// output type does not match `T` (a programming error: a topic was
    /// registered against the wrong type).
    pub fn resolve<T: 'static>(&self, topic: &str, payload: Value) -> Result<T, CodecError> {
        let decoder = self
            .decoders
            .get(topic)
            .ok_or_else(|| CodecError::UnknownTopic(topic.to_owned()))?;
        let boxed = decoder(payload)?;
        boxed
            .downcast::<T>()
            .map(|b| *b)
            .map_err(|_| CodecError::Serialization(format!("topic `{topic}` resolved to an unexpected type")))
    }

    /// Returns whether a decoder is registered under `topic`.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.decoders.contains_key(topic)
    }
}

impl fmt::Debug for TopicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("registered", &self.decoders.len())
            .finish()
    }
}
