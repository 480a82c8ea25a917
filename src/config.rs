//! Project metadata configuration
//!
//! Parses the `PROJECT.txt` key/value format: one entry per line, the first
//! whitespace-separated token is the key (lowercased), the rest of the line
//! is the value. Lines starting with `#` are comments; lines without a
//! second token are skipped. An absent file yields an empty mapping.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{Result, WhilrError};

static PROJECT_INFO: OnceLock<HashMap<String, String>> = OnceLock::new();

/// Load a key/value metadata file.
///
/// Returns an empty map if the file does not exist. Malformed lines are
/// silently skipped.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let bytes = fs::read(path)?;
    let data = String::from_utf8(bytes)
        .map_err(|e| WhilrError::Metadata(format!("{} is not valid UTF-8: {e}", path.display())))?;
    let data = data.replace("\r\n", "\n").replace('\r', "\n");

    let mut map = HashMap::new();
    for line in data.split('\n') {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(key) = parts.next() else { continue };
        let value = parts.collect::<Vec<_>>().join(" ");
        if value.is_empty() {
            continue;
        }
        map.insert(key.to_lowercase(), value);
    }

    log::info!("Loaded {} metadata entries from {}", map.len(), path.display());
    Ok(map)
}

/// Process-wide metadata for this crate, loaded once from the package's
/// own `PROJECT.txt`. A failed load logs a warning and yields an empty map.
pub fn project_info() -> &'static HashMap<String, String> {
    PROJECT_INFO.get_or_init(|| {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("PROJECT.txt");
        match load_config(&path) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("Failed to load project metadata from {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    })
}
