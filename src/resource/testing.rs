//! In-memory collaborators for provider tests

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;

use super::file_access::{FileOps, FileStat};
use super::identity::IdentityResolver;
use super::remote_file::{ConditionalRequest, FetchOutcome, Fetcher};
use crate::error::Error;
use crate::sysenv::{EnvStore, SystemRootLookup};

/// Map-backed user and group database
#[derive(Debug, Default)]
pub struct StaticIdentities {
    users: HashMap<String, u32>,
    groups: HashMap<String, u32>,
}

impl StaticIdentities {
    pub fn user(mut self, name: &str, uid: u32) -> Self {
        self.users.insert(name.to_string(), uid);
        self
    }

    pub fn group(mut self, name: &str, gid: u32) -> Self {
        self.groups.insert(name.to_string(), gid);
        self
    }
}

impl IdentityResolver for StaticIdentities {
    fn resolve_user(&self, name: &str) -> Option<u32> {
        self.users.get(name).copied()
    }

    fn resolve_group(&self, name: &str) -> Option<u32> {
        self.groups.get(name).copied()
    }
}

/// A mutating call made against [`RecordingFileOps`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsCall {
    Chown { uid: Option<u32>, gid: Option<u32> },
    Chmod(u32),
}

/// Fake filesystem metadata that records every chown/chmod
#[derive(Debug, Default)]
pub struct RecordingFileOps {
    files: Mutex<HashMap<PathBuf, FileStat>>,
    calls: Mutex<Vec<FsCall>>,
}

impl RecordingFileOps {
    /// Create or overwrite a file's metadata without recording a call
    pub fn add(&self, path: impl AsRef<Path>, stat: FileStat) {
        self.files
            .lock()
            .unwrap()
            .insert(path.as_ref().to_path_buf(), stat);
    }

    pub fn calls(&self) -> Vec<FsCall> {
        self.calls.lock().unwrap().clone()
    }

    fn update(&self, path: &Path, change: impl FnOnce(&mut FileStat)) -> io::Result<()> {
        let mut files = self.files.lock().unwrap();
        let stat = files
            .get_mut(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        change(stat);
        Ok(())
    }
}

impl FileOps for RecordingFileOps {
    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        self.calls.lock().unwrap().push(FsCall::Chown { uid, gid });
        self.update(path, |stat| {
            if let Some(uid) = uid {
                stat.uid = uid;
            }
            if let Some(gid) = gid {
                stat.gid = gid;
            }
        })
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.calls.lock().unwrap().push(FsCall::Chmod(mode));
        self.update(path, |stat| stat.mode = mode)
    }
}

/// A write made against [`MemoryEnv`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvWrite {
    Set(String, String),
    Remove(String),
}

/// Map-backed environment store
#[derive(Debug, Default)]
pub struct MemoryEnv {
    vars: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<EnvWrite>>,
}

impl MemoryEnv {
    pub fn with(self, name: &str, value: &str) -> Self {
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn writes(&self) -> Vec<EnvWrite> {
        self.writes.lock().unwrap().clone()
    }
}

impl EnvStore for MemoryEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.lock().unwrap().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(EnvWrite::Set(name.to_string(), value.to_string()));
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(EnvWrite::Remove(name.to_string()));
        self.vars.lock().unwrap().remove(name);
        Ok(())
    }
}

/// System root that never changes
#[derive(Debug, Clone)]
pub struct FixedSystemRoot(pub Option<String>);

impl SystemRootLookup for FixedSystemRoot {
    fn system_root(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A request seen by [`StubFetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenRequest {
    pub uri: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Fetcher that answers every request with the same canned outcome
#[derive(Debug)]
pub struct StubFetcher {
    outcome: Result<FetchOutcome, String>,
    requests: Mutex<Vec<SeenRequest>>,
}

impl StubFetcher {
    pub fn body(body: &str, etag: Option<&str>, last_modified: Option<&str>) -> Self {
        Self::answer(Ok(FetchOutcome::Fetched {
            body: body.as_bytes().to_vec(),
            etag: etag.map(str::to_string),
            last_modified: last_modified.map(str::to_string),
        }))
    }

    pub fn not_modified() -> Self {
        Self::answer(Ok(FetchOutcome::NotModified))
    }

    pub fn failing(message: &str) -> Self {
        Self::answer(Err(message.to_string()))
    }

    fn answer(outcome: Result<FetchOutcome, String>) -> Self {
        Self {
            outcome,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Fetcher for StubFetcher {
    fn fetch(&self, request: &ConditionalRequest<'_>) -> Result<FetchOutcome, Error> {
        self.requests.lock().unwrap().push(SeenRequest {
            uri: request.uri.to_string(),
            etag: request.etag.map(str::to_string),
            last_modified: request.last_modified.map(str::to_string),
        });

        self.outcome.clone().map_err(|message| Error::Fetch {
            uri: request.uri.to_string(),
            message,
        })
    }
}
