// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::path::{Path, PathBuf};

const DATA_DIR_ENV: &str = "DATA_DIR";

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path,
    }
}

fn env_data_dir() -> Option<String> {
    std::env::var(DATA_DIR_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the active data directory using precedence:
/// 1) explicit setting
/// 2) `DATA_DIR`
/// 3) cwd-relative `./data`
pub fn resolve_data_dir(explicit_data_dir: Option<&str>) -> PathBuf {
    explicit_data_dir
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .or_else(env_data_dir)
        .map(|dir| absolute(PathBuf::from(dir)))
        .unwrap_or_else(|| absolute(PathBuf::from("data")))
}

/// Absolute paths pass through; relative ones land under the data directory.
pub fn resolve_data_path(raw_path: &str, explicit_data_dir: Option<&str>) -> PathBuf {
    let as_path = PathBuf::from(raw_path);
    if as_path.is_absolute() {
        return as_path;
    }
    let relative = as_path
        .strip_prefix("data")
        .map(Path::to_path_buf)
        .unwrap_or(as_path);
    resolve_data_dir(explicit_data_dir).join(relative)
}

/// SQLite URL for a database file, creating its parent directory when missing.
pub fn sqlite_url_for(path: &Path) -> String {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        tracing::warn!(
            target: "config",
            path = %parent.display(),
            error = %e,
            "Failed to create data directory"
        );
    }
    format!("sqlite://{}", path.display())
}
