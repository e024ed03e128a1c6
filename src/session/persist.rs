use super::Credentials;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Read the session file into insertion-ordered entries.
///
/// A missing file is an empty collection.
pub(super) fn read_sessions(path: &Path) -> Result<Vec<(String, Credentials)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path).context("failed to read session file")?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let map: Map<String, Value> =
        serde_json::from_str(&raw).context("session file is not a JSON object")?;
    map.into_iter()
        .map(|(identity, value)| {
            let creds: Credentials = serde_json::from_value(value)
                .with_context(|| format!("invalid credentials for {identity}"))?;
            Ok((identity, creds))
        })
        .collect()
}

/// Replace the session file with `entries`, owner-only.
///
/// The content goes to a sibling temp file first and is renamed over the
/// target, so a reader never sees a half-written file.
pub(super) async fn write_sessions(path: &Path, entries: &[(String, Credentials)]) -> Result<()> {
    let mut map = Map::new();
    for (identity, creds) in entries {
        map.insert(identity.clone(), serde_json::to_value(creds)?);
    }
    let content = serde_json::to_string_pretty(&Value::Object(map))?;

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, &content))
        .await
        .context("session write task panicked")?
        .context("failed to write session file")
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::io::Write;
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        std::fs::set_permissions(&tmp, Permissions::from_mode(0o600))?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(&tmp, content)?;
    }

    std::fs::rename(&tmp, path)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "sessions.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
