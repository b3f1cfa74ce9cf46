//! Manifest loading
//!
//! A manifest is a TOML document with one array of tables per resource
//! kind:
//!
//! ```toml
//! [[file]]
//! path = "/etc/app.conf"
//! owner = "deploy"
//! mode = "0640"
//!
//! [[env]]
//! name = "PATH"
//! value = "/opt/app/bin"
//! delimiter = ":"
//! action = "modify"
//!
//! [[remote_file]]
//! path = "~/.local/share/app/ca.pem"
//! source = "https://pki.example.com/ca.pem"
//! mode = 0o644
//! ```

use anyhow::{Context, Result};
use cachectl::{BlobStore, FileCache};
use declarative::ExecutionPlan;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::Error;
use crate::paths;
use crate::resource::{
    AccessSpec, EnvAction, EnvSpec, EnvVar, FileAccess, FileOps, Fetcher, HttpFetcher, IdSpec,
    IdentityResolver, ModeSpec, RemoteFile, RemoteFileSpec, Resource, SystemFileOps,
    SystemIdentities,
};
use crate::sysenv::{EnvStore, EnvSystemRoot, PersistentEnv, SystemRootLookup};

// ============================================================================
// Manifest
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub file: Vec<FileEntry>,
    #[serde(default)]
    pub env: Vec<EnvEntry>,
    #[serde(default)]
    pub remote_file: Vec<RemoteFileEntry>,
}

/// Ownership and mode of an existing path
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    pub path: String,
    pub owner: Option<toml::Value>,
    pub group: Option<toml::Value>,
    pub mode: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvEntry {
    pub name: String,
    #[serde(default)]
    pub value: String,
    pub delimiter: Option<String>,
    #[serde(default)]
    pub action: EnvAction,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteFileEntry {
    pub path: String,
    pub source: String,
    pub owner: Option<toml::Value>,
    pub group: Option<toml::Value>,
    pub mode: Option<toml::Value>,
    #[serde(default = "default_true")]
    pub use_etag: bool,
    #[serde(default = "default_true")]
    pub use_last_modified: bool,
}

fn default_true() -> bool {
    true
}

impl FromStr for Manifest {
    type Err = toml::de::Error;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        toml::from_str(content)
    }
}

impl Manifest {
    /// Load a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest {}", path.display()))?;
        let manifest: Self = content
            .parse()
            .with_context(|| format!("Invalid manifest {}", path.display()))?;

        log::debug!(
            "Loaded {} file, {} env and {} remote_file entries from {}",
            manifest.file.len(),
            manifest.env.len(),
            manifest.remote_file.len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Total number of declared resources
    pub fn len(&self) -> usize {
        self.file.len() + self.env.len() + self.remote_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the resources of one run, in declaration order per kind
    pub fn into_plan(self, backends: &Backends) -> Result<ExecutionPlan<Resource>> {
        let mut plan = ExecutionPlan::new();

        for entry in self.file {
            let access = access_spec(
                entry.owner.as_ref(),
                entry.group.as_ref(),
                entry.mode.as_ref(),
            )
            .with_context(|| format!("Invalid [[file]] entry for {}", entry.path))?;
            plan.add_resource(backends.file_access(&entry.path, access).into());
        }

        for entry in self.env {
            let spec = EnvSpec {
                value: entry.value,
                delimiter: entry.delimiter.filter(|d| !d.is_empty()),
                action: entry.action,
            };
            plan.add_resource(backends.env_var(entry.name, spec).into());
        }

        for entry in self.remote_file {
            let access = access_spec(
                entry.owner.as_ref(),
                entry.group.as_ref(),
                entry.mode.as_ref(),
            )
            .with_context(|| format!("Invalid [[remote_file]] entry for {}", entry.path))?;
            let spec = RemoteFileSpec {
                source: entry.source,
                access,
                use_etag: entry.use_etag,
                use_last_modified: entry.use_last_modified,
            };
            plan.add_resource(backends.remote_file(&entry.path, spec).into());
        }

        Ok(plan)
    }
}

/// Owner or group as declared: a name or a numeric id
fn id_spec(attribute: &'static str, value: Option<&toml::Value>) -> Result<Option<IdSpec>, Error> {
    match value {
        None => Ok(None),
        Some(toml::Value::String(name)) => Ok(Some(IdSpec::Name(name.clone()))),
        Some(toml::Value::Integer(id)) => Ok(Some(IdSpec::Id(*id))),
        Some(other) => Err(Error::InvalidSpecification {
            attribute,
            value: other.to_string(),
            reason: "expected a name or a numeric id",
        }),
    }
}

/// Mode as declared: an octal string or integer bits
fn mode_spec(value: Option<&toml::Value>) -> Result<Option<ModeSpec>, Error> {
    match value {
        None => Ok(None),
        Some(toml::Value::String(octal)) => Ok(Some(ModeSpec::Octal(octal.clone()))),
        Some(toml::Value::Integer(bits)) => Ok(Some(ModeSpec::Bits(*bits))),
        Some(other) => Err(Error::InvalidSpecification {
            attribute: "mode",
            value: other.to_string(),
            reason: "expected an octal string or an integer",
        }),
    }
}

fn access_spec(
    owner: Option<&toml::Value>,
    group: Option<&toml::Value>,
    mode: Option<&toml::Value>,
) -> Result<AccessSpec, Error> {
    Ok(AccessSpec {
        owner: id_spec("owner", owner)?,
        group: id_spec("group", group)?,
        mode: mode_spec(mode)?,
    })
}

// ============================================================================
// Backends
// ============================================================================

/// The collaborators resources talk to
#[derive(Debug, Clone)]
pub struct Backends {
    pub identities: Arc<dyn IdentityResolver>,
    pub fs: Arc<dyn FileOps>,
    pub env: Arc<dyn EnvStore>,
    pub system_root: Arc<dyn SystemRootLookup>,
    pub cache: Arc<dyn BlobStore>,
    pub fetcher: Arc<dyn Fetcher>,
}

impl Backends {
    /// The real system, with state under the configured directories
    pub fn system() -> Result<Self> {
        let cache_dir = paths::cache_dir()?;
        let env_file = paths::env_file()?;
        log::debug!(
            "Cache at {}, environment file {}",
            cache_dir.display(),
            env_file.display()
        );

        Ok(Self {
            identities: Arc::new(SystemIdentities),
            fs: Arc::new(SystemFileOps),
            env: Arc::new(PersistentEnv::new(env_file)),
            system_root: Arc::new(EnvSystemRoot),
            cache: Arc::new(FileCache::new(cache_dir)),
            fetcher: Arc::new(HttpFetcher::new()),
        })
    }

    pub fn file_access(&self, path: &str, spec: AccessSpec) -> FileAccess {
        FileAccess::new(
            paths::expand(path),
            spec,
            self.identities.clone(),
            self.fs.clone(),
        )
    }

    pub fn env_var(&self, name: String, spec: EnvSpec) -> EnvVar {
        EnvVar::new(name, spec, self.env.clone(), self.system_root.clone())
    }

    pub fn remote_file(&self, path: &str, spec: RemoteFileSpec) -> RemoteFile {
        let access = self.file_access(path, spec.access.clone());
        RemoteFile::new(
            paths::expand(path),
            spec,
            self.cache.clone(),
            self.fetcher.clone(),
            access,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
