//! Download cache inspection

use anyhow::Result;
use cachectl::{CacheControlData, FileCache, cache_key, legacy_cache_key, redact_credentials};
use serde_json::json;

use crate::paths;
use crate::ui;

/// Print the current and legacy cache keys for a URI
pub fn key(uri: &str) -> Result<()> {
    ui::kv("uri", &redact_credentials(uri));
    ui::kv("key", &cache_key(uri));
    ui::kv("legacy key", &legacy_cache_key(uri));
    Ok(())
}

/// Print the validators cached for a URI
///
/// Loading may migrate a legacy entry to its current key.
pub fn show(uri: &str, checksum: Option<&str>) -> Result<()> {
    let store = FileCache::new(paths::cache_dir()?);
    let data = CacheControlData::load_and_validate(&store, uri, checksum)?;
    println!("{}", serde_json::to_string_pretty(&entry_json(&data))?);
    Ok(())
}

fn entry_json(data: &CacheControlData) -> serde_json::Value {
    json!({
        "uri": data.uri(),
        "key": data.key(),
        "etag": data.etag,
        "mtime": data.mtime,
        "checksum": data.checksum,
    })
}
