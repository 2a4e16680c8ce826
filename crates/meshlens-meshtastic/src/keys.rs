//! Channel key store
//!
//! Maps channel names to 32-byte AES keys. Short keys are expanded with
//! SHA-256 on registration, so the store never holds raw short key
//! material. The public default key only applies to the well-known
//! default channel names; any other channel needs an explicit key.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

use crate::config::{CHANNEL_KEY_LEN, DEFAULT_CHANNEL_KEY_B64, DEFAULT_CHANNEL_NAMES};
use crate::error::{DecodeError, Result};

/// An expanded 32-byte channel key
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelKey([u8; CHANNEL_KEY_LEN]);

impl ChannelKey {
    /// Expand raw key material into a channel key
    ///
    /// 32-byte keys are used as given, shorter non-empty keys are hashed
    /// with SHA-256, longer keys are rejected.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        match raw.len() {
            0 => Err(DecodeError::InvalidKey("key is empty".to_string())),
            CHANNEL_KEY_LEN => {
                let mut key = [0u8; CHANNEL_KEY_LEN];
                key.copy_from_slice(raw);
                Ok(Self(key))
            }
            len if len < CHANNEL_KEY_LEN => Ok(Self(Sha256::digest(raw).into())),
            len => Err(DecodeError::InvalidKey(format!(
                "key is {len} bytes, maximum is {CHANNEL_KEY_LEN}"
            ))),
        }
    }

    /// Decode base64 key text and expand it
    pub fn from_base64(text: &str) -> Result<Self> {
        let raw = BASE64
            .decode(text.trim())
            .map_err(|e| DecodeError::InvalidKey(format!("invalid base64: {e}")))?;
        Self::from_bytes(&raw)
    }

    /// The well-known public channel key
    pub fn default_key() -> Self {
        let raw = BASE64
            .decode(DEFAULT_CHANNEL_KEY_B64)
            .unwrap_or_default();
        Self(Sha256::digest(raw).into())
    }

    /// Key bytes
    pub fn as_bytes(&self) -> &[u8; CHANNEL_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelKey({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Whether a channel name is one of the public default channels
pub fn is_default_channel(name: &str) -> bool {
    DEFAULT_CHANNEL_NAMES.contains(&name)
}

/// Thread-safe channel name to key mapping
#[derive(Debug)]
pub struct ChannelKeyStore {
    keys: RwLock<HashMap<String, ChannelKey>>,
    default_key: ChannelKey,
}

impl Default for ChannelKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelKeyStore {
    /// Create a store holding only the default key
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            default_key: ChannelKey::default_key(),
        }
    }

    /// Create a store with extra base64 keys (channel name to key)
    pub fn with_keys(keys: &BTreeMap<String, String>) -> Result<Self> {
        let store = Self::new();
        for (channel, key) in keys {
            store.register_base64(channel, key)?;
        }
        Ok(store)
    }

    /// Register raw key material for a channel, replacing any previous key
    pub fn register(&self, channel: impl Into<String>, raw: &[u8]) -> Result<()> {
        let key = ChannelKey::from_bytes(raw)?;
        let channel = channel.into();
        debug!(channel = %channel, "Registered channel key");
        self.keys.write().insert(channel, key);
        Ok(())
    }

    /// Register a base64 key for a channel
    pub fn register_base64(&self, channel: impl Into<String>, key_b64: &str) -> Result<()> {
        let key = ChannelKey::from_base64(key_b64)?;
        let channel = channel.into();
        info!(channel = %channel, "Registered channel key");
        self.keys.write().insert(channel, key);
        Ok(())
    }

    /// Remove an explicit key
    pub fn remove(&self, channel: &str) -> bool {
        self.keys.write().remove(channel).is_some()
    }

    /// Key for a channel
    ///
    /// An explicit key wins. Otherwise the default key is returned only for
    /// default channel names; anything else is [`DecodeError::UnknownChannel`].
    pub fn resolve(&self, channel: &str) -> Result<ChannelKey> {
        if let Some(key) = self.keys.read().get(channel) {
            return Ok(key.clone());
        }
        if is_default_channel(channel) {
            return Ok(self.default_key.clone());
        }
        Err(DecodeError::UnknownChannel(channel.to_string()))
    }

    /// Whether a key would resolve for this channel
    pub fn has_key(&self, channel: &str) -> bool {
        self.keys.read().contains_key(channel) || is_default_channel(channel)
    }

    /// Channels with explicit keys, sorted
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.keys.read().keys().cloned().collect();
        names.sort();
        names
    }
}
