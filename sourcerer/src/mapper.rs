//! Serialize, compress, and encrypt an event on the way into storage;
//! reverse the pipeline on the way out.
//!
//! The three steps always run in the same order on write
//! (serialize → compress → encrypt) and the exact reverse on read
//! (decrypt → decompress → deserialize). Compression and encryption are
//! both optional; a [`Mapper`] built with neither configured is a plain
//! JSON codec.
//!
//! [`Mapper<T>`] decodes into a statically known `T`, the same way
//! `EventStore<A>` always knows `A::Event` at compile time — so a typed
//! event or snapshot field that holds a `Uuid`, `Decimal`, or
//! `DateTime<Utc>` gets its `{__type__, __data__}` envelope from the
//! `crate::transcoding` newtype wrappers directly, not from a registry
//! lookup here: by the time a payload has gone through
//! `serde_json::to_value`, a raw scalar's Rust type is already erased, so
//! there is nothing left for [`TranscoderRegistry`] to dispatch on. The
//! registry stays relevant for genuinely dynamic subtrees (a
//! `serde_json::Value`-typed field) via
//! [`TranscoderRegistry::decode_value`], and for consumers who don't know
//! `T` up front, which [`resolve_by_topic`] covers using [`TopicRegistry`]
//! (module J) instead.

use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use uuid::Uuid;

use crate::error::CodecError;
use crate::topic::TopicRegistry;
use crate::transcoding::TranscoderRegistry;

/// A compression algorithm applied to the serialized, pre-encryption bytes.
pub trait Compressor: Send + Sync {
    /// Compresses `data`.
    ///
    /// # Errors
    /// Returns [`CodecError::Compression`] if the underlying algorithm
    /// fails.
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decompresses `data`.
    ///
    /// # Errors
    /// Returns [`CodecError::Compression`] if `data` is not validly
    /// compressed.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Gzip compression via `flate2`.
pub struct GzipCompressor {
    level: Compression,
}

impl GzipCompressor {
    /// Creates a compressor at the default compression level.
    #[must_use]
    pub fn new() -> Self {
        Self { level: Compression::default() }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::new(), self.level);
        encoder.write_all(data).map_err(|e| CodecError::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| CodecError::Compression(e.to_string()))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| CodecError::Compression(e.to_string()))?;
        Ok(out)
    }
}

/// An authenticated cipher applied to the outermost (compressed, if
/// configured) bytes.
pub trait Cipher: Send + Sync {
    /// Encrypts `plaintext`, returning a self-contained ciphertext
    /// (implementations embed whatever nonce or tag they need).
    ///
    /// # Errors
    /// Returns [`CodecError::Encryption`] if the cipher fails.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Decrypts a value produced by [`Self::encrypt`].
    ///
    /// # Errors
    /// Returns [`CodecError::Encryption`] if authentication fails or
    /// `ciphertext` is malformed.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// AES-256-GCM, the authenticated-encryption analogue of a symmetric
/// `Fernet`-style cipher: a random 96-bit nonce is generated per message
/// and prepended to the ciphertext.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    /// Builds a cipher from a 32-byte key.
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        Self { cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)) }
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CodecError::Encryption(e.to_string()))?;
        let mut out = nonce.to_vec();
        out.append(&mut ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CodecError> {
        if ciphertext.len() < 12 {
            return Err(CodecError::Encryption("ciphertext shorter than a nonce".into()));
        }
        let (nonce, body) = ciphertext.split_at(12);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|e| CodecError::Encryption(e.to_string()))
    }
}

/// A header plus payload, merged into one flat JSON object on the wire —
/// the equivalent of stamping `originator_id`/`originator_version`/
/// `timestamp` directly onto the event instance before serializing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    /// The aggregate this event belongs to.
    pub originator_id: Uuid,
    /// The version this event produced.
    pub originator_version: u64,
    /// When this event was recorded.
    pub timestamp: DateTime<Utc>,
    /// The event's own fields.
    pub payload: T,
}

const FIELD_ORIGINATOR_ID: &str = "originator_id";
const FIELD_ORIGINATOR_VERSION: &str = "originator_version";
const FIELD_TIMESTAMP: &str = "timestamp";

/// Serializes, optionally compresses, and optionally encrypts an
/// [`Envelope`]; and reverses the pipeline on read.
pub struct Mapper<T> {
    registry: Arc<TranscoderRegistry>,
    compressor: Option<Box<dyn Compressor>>,
    cipher: Option<Box<dyn Cipher>>,
    _payload: std::marker::PhantomData<fn() -> T>,
}

impl<T> Mapper<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Builds a mapper with no compressor or cipher configured.
    #[must_use]
    pub fn new(registry: Arc<TranscoderRegistry>) -> Self {
        Self { registry, compressor: None, cipher: None, _payload: std::marker::PhantomData }
    }

    /// Attaches a compressor, applied after serialization and before
    /// encryption.
    #[must_use]
    pub fn with_compressor(mut self, compressor: impl Compressor + 'static) -> Self {
        self.compressor = Some(Box::new(compressor));
        self
    }

    /// Attaches a cipher, applied last on write and first on read.
    #[must_use]
    pub fn with_cipher(mut self, cipher: impl Cipher + 'static) -> Self {
        self.cipher = Some(Box::new(cipher));
        self
    }

    /// Returns the transcoding registry this mapper was built with, so
    /// callers can encode/decode dynamically-typed fields consistently.
    #[must_use]
    pub fn registry(&self) -> &TranscoderRegistry {
        &self.registry
    }

    /// Runs the full write-side pipeline: merge header into payload,
    /// serialize, compress, encrypt.
    ///
    /// # Errors
    /// Returns [`CodecError::Serialization`] if `envelope.payload` cannot
    /// be represented as a JSON object, or the underlying compressor/cipher
    /// error.
    pub fn from_event(&self, envelope: &Envelope<T>) -> Result<Vec<u8>, CodecError> {
        let payload_value =
            serde_json::to_value(&envelope.payload).map_err(|e| CodecError::Serialization(e.to_string()))?;
        let mut fields = match payload_value {
            Value::Object(map) => map,
            other => {
                return Err(CodecError::Serialization(format!(
                    "event payload must serialize to a JSON object, got {other}"
                )));
            }
        };
        fields.insert(FIELD_ORIGINATOR_ID.to_owned(), Value::String(envelope.originator_id.to_string()));
        fields.insert(
            FIELD_ORIGINATOR_VERSION.to_owned(),
            Value::Number(envelope.originator_version.into()),
        );
        fields.insert(
            FIELD_TIMESTAMP.to_owned(),
            Value::String(envelope.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
        );

        let mut bytes = serde_json::to_vec(&Value::Object(fields)).map_err(|e| CodecError::Serialization(e.to_string()))?;
        if let Some(compressor) = &self.compressor {
            bytes = compressor.compress(&bytes)?;
        }
        if let Some(cipher) = &self.cipher {
            bytes = cipher.encrypt(&bytes)?;
        }
        Ok(bytes)
    }

    /// Runs the full read-side pipeline: decrypt, decompress, deserialize,
    /// split header back out of the payload.
    ///
    /// # Errors
    /// Returns [`CodecError::Serialization`] if the header fields are
    /// missing or malformed, or the underlying cipher/compressor error.
    pub fn to_event(&self, bytes: Vec<u8>) -> Result<Envelope<T>, CodecError> {
        let (originator_id, originator_version, timestamp, fields) =
            decode_header(bytes, self.compressor.as_deref(), self.cipher.as_deref())?;
        let payload: T =
            serde_json::from_value(Value::Object(fields)).map_err(|e| CodecError::Serialization(e.to_string()))?;
        Ok(Envelope { originator_id, originator_version, timestamp, payload })
    }
}

/// Runs the decrypt/decompress/deserialize side of the pipeline and splits
/// the header fields back out, stopping short of decoding the payload into
/// any particular type.
fn decode_header(
    mut bytes: Vec<u8>,
    compressor: Option<&dyn Compressor>,
    cipher: Option<&dyn Cipher>,
) -> Result<(Uuid, u64, DateTime<Utc>, serde_json::Map<String, Value>), CodecError> {
    if let Some(cipher) = cipher {
        bytes = cipher.decrypt(&bytes)?;
    }
    if let Some(compressor) = compressor {
        bytes = compressor.decompress(&bytes)?;
    }
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| CodecError::Serialization(e.to_string()))?;
    let mut fields = match value {
        Value::Object(map) => map,
        other => {
            return Err(CodecError::Serialization(format!("stored record is not a JSON object, got {other}")));
        }
    };

    let originator_id = fields
        .remove(FIELD_ORIGINATOR_ID)
        .and_then(|v| v.as_str().map(str::to_owned))
        .ok_or_else(|| CodecError::Serialization("missing originator_id".into()))?;
    let originator_id = Uuid::parse_str(&originator_id).map_err(|e| CodecError::Serialization(e.to_string()))?;
    let originator_version = fields
        .remove(FIELD_ORIGINATOR_VERSION)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| CodecError::Serialization("missing originator_version".into()))?;
    let timestamp = fields
        .remove(FIELD_TIMESTAMP)
        .and_then(|v| v.as_str().map(str::to_owned))
        .ok_or_else(|| CodecError::Serialization("missing timestamp".into()))?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CodecError::Serialization(e.to_string()))?;

    Ok((originator_id, originator_version, timestamp, fields))
}

/// Decodes a stored record's bytes into whatever type its `topic` resolves
/// to in `topics`, for readers that see records from more than one
/// aggregate or event type in a single stream — the notification log's
/// consumers, chiefly — and so can't fix `T` on a [`Mapper<T>`] up front.
///
/// # Errors
/// Returns [`CodecError::Serialization`] if the header fields are missing
/// or malformed, [`CodecError::UnknownTopic`] if no decoder is registered
/// for `topic`, or the underlying cipher/compressor error.
pub fn resolve_by_topic<T: 'static>(
    topics: &TopicRegistry,
    compressor: Option<&dyn Compressor>,
    cipher: Option<&dyn Cipher>,
    topic: &str,
    bytes: Vec<u8>,
) -> Result<Envelope<T>, CodecError> {
    let (originator_id, originator_version, timestamp, fields) = decode_header(bytes, compressor, cipher)?;
    let payload = topics.resolve(topic, Value::Object(fields))?;
    Ok(Envelope { originator_id, originator_version, timestamp, payload })
}

impl<T> std::fmt::Debug for Mapper<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mapper")
            .field("compressor", &self.compressor.is_some())
            .field("cipher", &self.cipher.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg(test)]
struct Deposited {
    amount: crate::transcoding::DecimalStr,
}
