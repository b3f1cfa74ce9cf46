//! Domain errors raised by steward's resource providers
//!
//! Providers return `anyhow::Result`; these errors travel inside it and
//! can be recovered with `downcast_ref` where a caller cares which one
//! it got.

use std::fmt;
use thiserror::Error;

/// Which identity database a lookup went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    User,
    Group,
}

impl IdentityKind {
    /// Attribute name this kind of identity is managed through
    pub fn attribute(self) -> &'static str {
        match self {
            Self::User => "owner",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Owner or group name does not resolve on this system
    #[error("cannot determine {kind} id for '{name}', does the {kind} exist on this system?")]
    IdentityNotFound { kind: IdentityKind, name: String },

    /// Owner, group or mode given as a value of an unexpected type
    #[error("invalid {attribute} specification {value}: {reason}")]
    InvalidSpecification {
        attribute: &'static str,
        value: String,
        reason: &'static str,
    },

    /// `modify` requested on a variable that does not exist
    #[error("cannot modify {0}: environment variable does not exist")]
    VariableNotFound(String),

    /// Downloading a remote file failed
    #[error("failed to fetch {uri}: {message}")]
    Fetch { uri: String, message: String },
}
