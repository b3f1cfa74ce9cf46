//! Managed resources
//!
//! Every kind steward manages is one variant of [`Resource`]. The enum
//! forwards the [`Converge`] contract to its variant, so the engine works
//! on a single concrete type.

pub mod env;
pub mod file_access;
pub mod identity;
pub mod remote_file;
#[cfg(test)]
pub mod testing;

use anyhow::Result;
use declarative::{ApplyContext, ApplyResult, Converge, Issue};

pub use env::{EnvAction, EnvSpec, EnvVar};
pub use file_access::{AccessSpec, FileAccess, FileOps, IdSpec, ModeSpec, SystemFileOps};
pub use identity::{Identifier, IdentityResolver, SystemIdentities};
pub use remote_file::{Fetcher, HttpFetcher, RemoteFile, RemoteFileSpec};

/// A resource of any kind
#[derive(Debug)]
pub enum Resource {
    File(FileAccess),
    Env(EnvVar),
    RemoteFile(RemoteFile),
}

macro_rules! each {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            Resource::File($r) => $body,
            Resource::Env($r) => $body,
            Resource::RemoteFile($r) => $body,
        }
    };
}

impl Converge for Resource {
    fn id(&self) -> String {
        each!(self, r => r.id())
    }

    fn resource_type(&self) -> &'static str {
        each!(self, r => r.resource_type())
    }

    fn description(&self) -> String {
        each!(self, r => r.description())
    }

    fn load_current_state(&mut self) -> Result<()> {
        each!(self, r => r.load_current_state())
    }

    fn validate(&self) -> Vec<Issue> {
        each!(self, r => r.validate())
    }

    fn needs_update(&self) -> bool {
        each!(self, r => r.needs_update())
    }

    fn describe_changes(&self) -> Vec<String> {
        each!(self, r => r.describe_changes())
    }

    fn apply(&mut self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        each!(self, r => r.apply(ctx))
    }

    fn always_apply(&self) -> bool {
        each!(self, r => r.always_apply())
    }
}

impl From<FileAccess> for Resource {
    fn from(resource: FileAccess) -> Self {
        Self::File(resource)
    }
}

impl From<EnvVar> for Resource {
    fn from(resource: EnvVar) -> Self {
        Self::Env(resource)
    }
}

impl From<RemoteFile> for Resource {
    fn from(resource: RemoteFile) -> Self {
        Self::RemoteFile(resource)
    }
}
