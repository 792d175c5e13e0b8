//! The environment surface this crate's callers are expected to read,
//! pinned here as a plain struct rather than ambient environment lookups
//! scattered through constructors.
//!
//! Building this struct (via [`RuntimeConfig::from_env`]) is the only
//! place `std::env` is read. Everything downstream — recorders, mappers,
//! the repository's snapshot frequency — takes the resulting values by
//! reference or by move, never by looking the environment up itself.
//! Wiring a [`RuntimeConfig`] into concrete cipher/compressor/recorder
//! instances is left to the caller; this module stops at parsing the
//! environment into typed values.

use std::env;

/// Configuration read from the environment at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// The symmetric key for [`crate::mapper::AesGcmCipher`], present only
    /// when both `CIPHER_TOPIC` and `CIPHER_KEY` are set.
    pub cipher_key: Option<Vec<u8>>,
    /// Whether `COMPRESSOR_TOPIC` was set, enabling gzip compression.
    pub compressor_enabled: bool,
    /// `IS_SNAPSHOTTING_ENABLED` — whether a snapshot store should be wired up.
    pub snapshotting_enabled: bool,
    /// `CREATE_TABLE` — whether a storage backend should create its tables/trees at startup.
    pub create_tables: bool,
    /// The notification log's page size.
    pub section_size: u64,
}

const DEFAULT_SECTION_SIZE: u64 = 10;

impl RuntimeConfig {
    /// Reads the environment variables a deployment is expected to set.
    ///
    /// A prefix, when given, is tried first for every variable
    /// (`"{prefix}_{name}"`), falling back to the bare name — this is the
    /// "per-application variants... take precedence over the bare key"
    /// rule.
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingCipherKey`] if `CIPHER_TOPIC` is set
    /// without `CIPHER_KEY`. Returns [`ConfigError::InvalidValue`] if a
    /// boolean or integer variable is set but fails to parse.
    pub fn from_env(prefix: Option<&str>) -> Result<Self, ConfigError> {
        let cipher_topic = lookup(prefix, "CIPHER_TOPIC");
        let cipher_key = lookup(prefix, "CIPHER_KEY");
        let cipher_key = match (cipher_topic, cipher_key) {
            (Some(_), Some(key)) => Some(key.into_bytes()),
            (Some(_), None) => return Err(ConfigError::MissingCipherKey),
            (None, _) => None,
        };

        let compressor_enabled = lookup(prefix, "COMPRESSOR_TOPIC").is_some();
        let snapshotting_enabled = parse_bool(prefix, "IS_SNAPSHOTTING_ENABLED")?;
        let create_tables = parse_bool(prefix, "CREATE_TABLE")?;
        let section_size = match lookup(prefix, "NOTIFICATION_LOG_SECTION_SIZE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue("NOTIFICATION_LOG_SECTION_SIZE"))?,
            None => DEFAULT_SECTION_SIZE,
        };

        Ok(Self { cipher_key, compressor_enabled, snapshotting_enabled, create_tables, section_size })
    }
}

fn lookup(prefix: Option<&str>, name: &str) -> Option<String> {
    if let Some(prefix) = prefix {
        if let Ok(value) = env::var(format!("{prefix}_{name}")) {
            return Some(value);
        }
    }
    env::var(name).ok()
}

fn parse_bool(prefix: Option<&str>, name: &'static str) -> Result<bool, ConfigError> {
    match lookup(prefix, name) {
        None => Ok(false),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name)),
        },
    }
}

/// Failures building a [`RuntimeConfig`] from the environment.
#[derive(Debug, thiserror::Error, Clone)]
pub enum ConfigError {
    /// `CIPHER_TOPIC` was set without a corresponding `CIPHER_KEY`.
    #[error("CIPHER_TOPIC set without CIPHER_KEY")]
    MissingCipherKey,
    /// A variable was present but could not be parsed as its expected type.
    #[error("invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear() {
        for name in ["CIPHER_TOPIC", "CIPHER_KEY", "COMPRESSOR_TOPIC", "IS_SNAPSHOTTING_ENABLED", "CREATE_TABLE", "NOTIFICATION_LOG_SECTION_SIZE"] {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    fn defaults_with_nothing_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        let config = RuntimeConfig::from_env(None).unwrap();
        assert!(config.cipher_key.is_none());
        assert!(!config.compressor_enabled);
        assert!(!config.snapshotting_enabled);
        assert!(!config.create_tables);
        assert_eq!(config.section_size, DEFAULT_SECTION_SIZE);
    }

    #[test]
    fn cipher_topic_without_key_is_an_environment_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        unsafe { env::set_var("CIPHER_TOPIC", "aes_gcm") };
        let err = RuntimeConfig::from_env(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCipherKey));
        clear();
    }

    #[test]
    fn cipher_topic_with_key_is_accepted() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        unsafe {
            env::set_var("CIPHER_TOPIC", "aes_gcm");
            env::set_var("CIPHER_KEY", "0123456789abcdef0123456789abcdef");
        }
        let config = RuntimeConfig::from_env(None).unwrap();
        assert_eq!(config.cipher_key.as_deref(), Some("0123456789abcdef0123456789abcdef".as_bytes()));
        clear();
    }

    #[test]
    fn a_prefixed_variable_takes_precedence_over_the_bare_key() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        unsafe {
            env::set_var("CREATE_TABLE", "false");
            env::set_var("BANK_CREATE_TABLE", "true");
        }
        let config = RuntimeConfig::from_env(Some("BANK")).unwrap();
        assert!(config.create_tables);
        clear();
    }
}
