//! Files downloaded from a URI with conditional GET
//!
//! The `ETag` and `Last-Modified` validators of the previous download are
//! kept in the cache-control store, tied to the checksum of the file they
//! produced. A file replaced out-of-band therefore never reuses stale
//! validators and is downloaded again.

use anyhow::{Context, Result};
use cachectl::{BlobStore, CacheControlData};
use declarative::{
    ApplyContext, ApplyResult, Converge, Issue, Probe, ResourceState, describe_change,
};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::file_access::{AccessSpec, FileAccess};
use crate::error::Error;

/// Largest body accepted from a server
const MAX_DOWNLOAD_SIZE: u64 = 512 * 1024 * 1024;

/// A GET carrying whatever validators are known
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalRequest<'a> {
    pub uri: &'a str,
    /// Sent as `If-None-Match`
    pub etag: Option<&'a str>,
    /// Sent as `If-Modified-Since`
    pub last_modified: Option<&'a str>,
}

/// What the server answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `304 Not Modified`
    NotModified,
    /// A full body and the validators that came with it
    Fetched {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

/// HTTP transport
pub trait Fetcher: Send + Sync + fmt::Debug {
    fn fetch(&self, request: &ConditionalRequest<'_>) -> Result<FetchOutcome, Error>;
}

/// [`Fetcher`] backed by a `ureq` agent
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher").finish_non_exhaustive()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &ConditionalRequest<'_>) -> Result<FetchOutcome, Error> {
        let failed = |message: String| Error::Fetch {
            uri: cachectl::redact_credentials(request.uri).into_owned(),
            message,
        };

        let mut get = self
            .agent
            .get(request.uri)
            .header("User-Agent", concat!("steward/", env!("CARGO_PKG_VERSION")));
        if let Some(etag) = request.etag {
            get = get.header("If-None-Match", etag);
        }
        if let Some(last_modified) = request.last_modified {
            get = get.header("If-Modified-Since", last_modified);
        }

        let mut response = get.call().map_err(|e| failed(e.to_string()))?;
        if response.status() == 304 {
            return Ok(FetchOutcome::NotModified);
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let etag = header("etag");
        let last_modified = header("last-modified");

        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_DOWNLOAD_SIZE)
            .read_to_vec()
            .map_err(|e| failed(format!("failed to read response body: {e}")))?;

        Ok(FetchOutcome::Fetched {
            body,
            etag,
            last_modified,
        })
    }
}

/// Lowercase hex SHA-256 of a byte slice
pub fn checksum_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase hex SHA-256 of a file, `None` if it does not exist
pub fn checksum_file(path: &Path) -> Result<Option<String>> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to open {}", path.display())),
    };

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Some(hex::encode(hasher.finalize())))
}

/// Declared state of a downloaded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileSpec {
    pub source: String,
    pub access: AccessSpec,
    pub use_etag: bool,
    pub use_last_modified: bool,
}

/// Converges one downloaded file and its access attributes
#[derive(Debug)]
pub struct RemoteFile {
    state: ResourceState<RemoteFileSpec, Probe<String>>,
    path: PathBuf,
    cache: CacheControlData,
    store: Arc<dyn BlobStore>,
    fetcher: Arc<dyn Fetcher>,
    access: FileAccess,
}

impl RemoteFile {
    pub fn new(
        path: impl AsRef<Path>,
        spec: RemoteFileSpec,
        store: Arc<dyn BlobStore>,
        fetcher: Arc<dyn Fetcher>,
        access: FileAccess,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            cache: CacheControlData::new(&spec.source),
            state: ResourceState::new(path.to_string_lossy(), spec),
            path,
            store,
            fetcher,
            access,
        }
    }

    /// Validators loaded for the file on disk
    pub fn cache(&self) -> &CacheControlData {
        &self.cache
    }

    pub fn is_updated(&self) -> bool {
        self.state.is_updated() || self.access.is_updated()
    }

    fn current_checksum(&self) -> Option<&str> {
        self.state
            .current()
            .and_then(Probe::value)
            .map(String::as_str)
    }

    fn request(&self) -> ConditionalRequest<'_> {
        let spec = &self.state.desired;
        ConditionalRequest {
            uri: &spec.source,
            etag: self.cache.etag.as_deref().filter(|_| spec.use_etag),
            last_modified: self.cache.mtime.as_deref().filter(|_| spec.use_last_modified),
        }
    }

    /// Write `body` beside the destination, then move it into place
    fn install(&self, body: &[u8]) -> Result<()> {
        let name = self
            .path
            .file_name()
            .with_context(|| format!("Not a file path: {}", self.path.display()))?;
        let staging = self
            .path
            .with_file_name(format!(".{}.steward-tmp", name.to_string_lossy()));

        fs::write(&staging, body)
            .with_context(|| format!("Failed to write {}", staging.display()))?;

        // New content keeps the permissions of the file it replaces
        let moved = match fs::metadata(&self.path) {
            Ok(existing) => fs::set_permissions(&staging, existing.permissions()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
        .and_then(|()| fs::rename(&staging, &self.path));

        if let Err(e) = moved {
            let _ = fs::remove_file(&staging);
            return Err(e)
                .with_context(|| format!("Failed to move download into {}", self.path.display()));
        }
        Ok(())
    }

    /// Download if needed, returning whether the content changed
    fn fetch_content(&mut self) -> Result<bool> {
        let outcome = self.fetcher.fetch(&self.request())?;

        let (body, etag, last_modified) = match outcome {
            FetchOutcome::NotModified => {
                log::debug!("{} not modified", self.cache.uri());
                return Ok(false);
            }
            FetchOutcome::Fetched {
                body,
                etag,
                last_modified,
            } => (body, etag, last_modified),
        };

        let checksum = checksum_bytes(&body);
        let changed = self.current_checksum() != Some(checksum.as_str());
        if changed {
            self.install(&body)?;
            log::info!(
                "Updated {} from {} ({} bytes)",
                self.path.display(),
                self.cache.uri(),
                body.len()
            );
            self.state.set_current(Probe::Value(checksum.clone()));
            self.state.mark_updated();
        } else {
            log::debug!("{} content unchanged", self.path.display());
        }

        self.cache.etag = etag;
        self.cache.mtime = last_modified;
        self.cache.checksum = Some(checksum);
        self.cache
            .save(self.store.as_ref())
            .with_context(|| format!("Failed to save cache-control data for {}", self.cache.uri()))?;

        Ok(changed)
    }
}

impl Converge for RemoteFile {
    fn id(&self) -> String {
        format!("remote_file:{}", self.path.display())
    }

    fn resource_type(&self) -> &'static str {
        "remote_file"
    }

    fn description(&self) -> String {
        format!("{} from {}", self.path.display(), self.cache.uri())
    }

    fn load_current_state(&mut self) -> Result<()> {
        let checksum = checksum_file(&self.path)?;
        self.cache = CacheControlData::load_and_validate(
            self.store.as_ref(),
            &self.state.desired.source,
            checksum.as_deref(),
        )?;
        log::debug!(
            "{}: checksum {:?}, etag {:?}, last-modified {:?}",
            self.path.display(),
            checksum,
            self.cache.etag,
            self.cache.mtime
        );
        self.state.set_current(Probe::from(checksum));
        self.access.load_current_state()
    }

    fn validate(&self) -> Vec<Issue> {
        self.access
            .validate()
            .into_iter()
            .map(|issue| Issue::new(self.id(), issue.message))
            .collect()
    }

    fn needs_update(&self) -> bool {
        self.current_checksum().is_none() || self.access.needs_update()
    }

    fn describe_changes(&self) -> Vec<String> {
        let mut changes = Vec::new();
        if self.current_checksum().is_none() {
            changes.push(describe_change("content", "", self.cache.uri()));
        }
        changes.extend(self.access.describe_changes());
        changes
    }

    fn apply(&mut self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        let existed = self.current_checksum().is_some();
        let content_changed = self.fetch_content()?;
        let access = self.access.apply(ctx)?;

        Ok(match (existed, content_changed || access.is_change()) {
            (false, _) => ApplyResult::Created,
            (true, true) => ApplyResult::Modified,
            (true, false) => ApplyResult::NoChange,
        })
    }

    fn always_apply(&self) -> bool {
        true
    }
}
