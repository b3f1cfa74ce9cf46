//! # cachectl
//!
//! Persistence for HTTP conditional-request validators.
//!
//! When a file is downloaded, the server's `ETag` and `Last-Modified`
//! headers are remembered together with the checksum of the file that was
//! written. On the next run those validators are offered back to the server
//! (`If-None-Match` / `If-Modified-Since`) - but only if the file on disk
//! still has the recorded checksum. A file replaced out-of-band must never
//! be "validated" by stale headers.
//!
//! ## Keys
//!
//! Entries are stored under `remote_file/<friendly>-<sha256>.json`, where
//! `friendly` is the URI with credentials redacted, every non-alphanumeric
//! character replaced by `_`, truncated to 64 characters. Entries written
//! under the older SHA-1 scheme are migrated on first read.
//!
//! ```
//! let key = cachectl::cache_key("http://www.google.com/robots.txt");
//! assert!(key.starts_with("remote_file/http___www_google_com_robots_txt-"));
//! assert!(key.ends_with(".json"));
//! ```
//!
//! ## Failure policy
//!
//! A record that cannot be decoded is treated as a cache miss. Blob store
//! I/O errors are returned to the caller.
//!
//! ## Example
//!
//! ```
//! use cachectl::{CacheControlData, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let uri = "https://example.com/app.tar.gz";
//!
//! let mut entry = CacheControlData::load_and_validate(&store, uri, None).unwrap();
//! assert!(entry.is_empty());
//!
//! entry.etag = Some("\"abc\"".to_string());
//! entry.checksum = Some("deadbeef".to_string());
//! entry.save(&store).unwrap();
//!
//! let entry = CacheControlData::load_and_validate(&store, uri, Some("deadbeef")).unwrap();
//! assert_eq!(entry.etag.as_deref(), Some("\"abc\""));
//! ```

pub mod control;
pub mod error;
pub mod key;
pub mod store;

pub use control::{CacheControlData, CacheRecord};
pub use error::{Error, Result};
pub use key::{
    CACHE_NAMESPACE, KeyScheme, MAX_FRIENDLY_LEN, REDACTED_PASSWORD, cache_key, friendly_name,
    legacy_cache_key, redact_credentials,
};
pub use store::{BlobStore, FileCache, MemoryStore, StoreStats};
