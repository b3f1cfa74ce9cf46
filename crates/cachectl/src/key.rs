//! Cache key derivation
//!
//! A key has to be safe to use as a file name, bounded in length no matter
//! how long the URI is, unique per URI, and must never carry a password.

use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::sync::LazyLock;

/// Directory (key prefix) all cache-control entries live under
pub const CACHE_NAMESPACE: &str = "remote_file";

/// Maximum length of the human-readable part of a key
pub const MAX_FRIENDLY_LEN: usize = 64;

/// Replaces any password embedded in a URI
pub const REDACTED_PASSWORD: &str = "XXXX";

const EXTENSION: &str = "json";

/// scheme://userinfo@ at the start of a URI
static USERINFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*://)(?P<userinfo>[^/?#@]*)@")
        .expect("userinfo pattern is valid")
});

/// Digest used for the unique part of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    /// Current scheme
    Sha256,
    /// Older, shorter digest; only read for one-time migration
    LegacySha1,
}

impl KeyScheme {
    /// Lowercase hex digest of `input`
    pub fn digest(self, input: &str) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
            Self::LegacySha1 => hex::encode(Sha1::digest(input.as_bytes())),
        }
    }
}

/// Replace the password of a URI's userinfo with [`REDACTED_PASSWORD`]
///
/// Any URI that carries userinfo is rewritten as `user:XXXX@`, whether or
/// not a password was present. URIs without userinfo are returned as-is.
pub fn redact_credentials(uri: &str) -> Cow<'_, str> {
    let Some(caps) = USERINFO.captures(uri) else {
        return Cow::Borrowed(uri);
    };

    let user = caps["userinfo"]
        .split_once(':')
        .map_or(&caps["userinfo"], |(user, _)| user);
    let whole = caps.get(0).map_or(0, |m| m.end());

    Cow::Owned(format!(
        "{}{}:{}@{}",
        &caps["scheme"],
        user,
        REDACTED_PASSWORD,
        &uri[whole..]
    ))
}

/// Human-readable, file-name-safe prefix of a key
///
/// Every character that is not an ASCII letter or digit becomes `_`; the
/// result is cut at [`MAX_FRIENDLY_LEN`] characters.
pub fn friendly_name(uri: &str) -> String {
    uri.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_FRIENDLY_LEN)
        .collect()
}

/// Basename (without namespace) of the entry for `uri` under `scheme`
pub fn cache_basename(uri: &str, scheme: KeyScheme) -> String {
    let redacted = redact_credentials(uri);
    format!(
        "{}-{}.{}",
        friendly_name(&redacted),
        scheme.digest(&redacted),
        EXTENSION
    )
}

/// Store key for `uri` under the current scheme
pub fn cache_key(uri: &str) -> String {
    format!("{}/{}", CACHE_NAMESPACE, cache_basename(uri, KeyScheme::Sha256))
}

/// Store key for `uri` under the legacy scheme
pub fn legacy_cache_key(uri: &str) -> String {
    format!(
        "{}/{}",
        CACHE_NAMESPACE,
        cache_basename(uri, KeyScheme::LegacySha1)
    )
}
