//! Cache-control data for one URI

use crate::error::Result;
use crate::key::{cache_key, legacy_cache_key, redact_credentials};
use crate::store::BlobStore;
use serde::{Deserialize, Serialize};

/// Persisted layout of an entry
///
/// Field presence is what matters downstream: a missing `etag` means "do
/// not send If-None-Match".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub mtime: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl CacheRecord {
    /// Decode persisted bytes
    ///
    /// Anything that is not a JSON object whose fields are strings (or
    /// absent) decodes to `None`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let value: serde_json::Value = match serde_json::from_slice(bytes) {
            Ok(value) => value,
            Err(e) => {
                log::debug!("Cache record is not valid JSON: {}", e);
                return None;
            }
        };

        if !value.is_object() {
            log::debug!("Cache record is not an object");
            return None;
        }

        serde_json::from_value(value)
            .inspect_err(|e| log::debug!("Cache record has unexpected shape: {}", e))
            .ok()
    }
}

/// Validators for one URI, as loaded from (and saved to) a blob store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheControlData {
    uri: String,
    /// `ETag` returned by the server
    pub etag: Option<String>,
    /// `Last-Modified` returned by the server
    pub mtime: Option<String>,
    /// Checksum of the artifact written alongside these validators
    pub checksum: Option<String>,
}

impl CacheControlData {
    /// An empty entry for `uri`; credentials are redacted immediately
    pub fn new(uri: &str) -> Self {
        Self {
            uri: redact_credentials(uri).into_owned(),
            etag: None,
            mtime: None,
            checksum: None,
        }
    }

    /// Load the entry for `uri` and keep it only if it belongs to the file
    /// currently on disk
    ///
    /// `current_checksum` is the checksum of the artifact on disk, or
    /// `None` when there is no artifact yet. The result is empty when:
    /// - no entry exists under the current or legacy key
    /// - the stored bytes cannot be decoded
    /// - the stored checksum differs from `current_checksum`
    /// - `current_checksum` is `None`
    ///
    /// An entry found only under the legacy key is rewritten under the
    /// current key and the legacy key deleted before it is used.
    pub fn load_and_validate(
        store: &dyn BlobStore,
        uri: &str,
        current_checksum: Option<&str>,
    ) -> Result<Self> {
        let mut data = Self::new(uri);

        let Some(record) = data.load_record(store)? else {
            return Ok(data);
        };

        match (current_checksum, record.checksum.as_deref()) {
            (Some(current), Some(recorded)) if current == recorded => {
                data.etag = record.etag;
                data.mtime = record.mtime;
                data.checksum = record.checksum;
            }
            _ => {
                log::debug!(
                    "Discarding cache-control data for {}: artifact checksum changed",
                    data.uri
                );
            }
        }

        Ok(data)
    }

    /// Read the persisted record, migrating from the legacy key if needed
    fn load_record(&self, store: &dyn BlobStore) -> Result<Option<CacheRecord>> {
        let key = self.key();

        let bytes = if store.exists(&key) {
            store.load(&key)?
        } else {
            let legacy = legacy_cache_key(&self.uri);
            if !store.exists(&legacy) {
                return Ok(None);
            }

            log::info!("Migrating cache-control data for {} to {}", self.uri, key);
            let bytes = store.load(&legacy)?;
            store.store(&key, &bytes)?;
            store.delete(&legacy)?;
            bytes
        };

        let record = CacheRecord::decode(&bytes);
        if record.is_none() {
            log::warn!(
                "Ignoring unreadable cache-control data for {} ({})",
                self.uri,
                key
            );
        }
        Ok(record)
    }

    /// Persist the validators under the current key
    pub fn save(&self, store: &dyn BlobStore) -> Result<()> {
        let record = CacheRecord {
            etag: self.etag.clone(),
            mtime: self.mtime.clone(),
            checksum: self.checksum.clone(),
        };
        let bytes = serde_json::to_vec(&record)?;
        store.store(&self.key(), &bytes)
    }

    /// The URI with credentials redacted
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Store key of this entry (always the current scheme)
    pub fn key(&self) -> String {
        cache_key(&self.uri)
    }

    /// Whether the entry carries no validators
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.mtime.is_none()
    }
}
