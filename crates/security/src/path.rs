//! Path validation: filesystem sandboxing for file tools.
//!
//! Blocks path traversal, system directories, configured forbidden paths and
//! personal folders under the user's home. Temp and cache locations remain
//! reachable.

use std::path::{Component, Path, PathBuf};

use ferrule_core::error::ToolError;

/// System directory prefixes (lowercase, forward slashes).
pub const SYSTEM_DIRS: &[&str] = &[
    "/etc",
    "/bin",
    "/sbin",
    "/usr",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/root",
    "/var",
    "/lib",
    "/lib64",
    "/private/etc",
    "/private/var/db",
    "/system",
    "c:/windows",
    "c:/program files",
    "c:/program files (x86)",
    "c:/programdata",
];

/// Subpaths of system directories that hold scratch data.
const SYSTEM_TEMP_EXCEPTIONS: &[&str] = &["/var/tmp", "/var/folders", "/private/var/folders"];

/// Personal folders directly under the user's home.
pub const PERSONAL_FOLDERS: &[&str] = &[
    "desktop",
    "documents",
    "downloads",
    "pictures",
    "music",
    "videos",
    "movies",
    "library",
    ".ssh",
    ".gnupg",
    ".aws",
];

/// Path components that mark temp/cache locations.
const TEMP_MARKERS: &[&str] = &[".cache", "tmp", "temp", ".tmp"];

/// Error returned when path validation fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path is empty")]
    Empty,

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path '{path}' is inside system directory '{dir}'")]
    SystemDirectory { path: String, dir: String },

    #[error("Path '{path}' matches forbidden pattern '{pattern}'")]
    ForbiddenPath { path: String, pattern: String },

    #[error("Path '{path}' is inside personal folder '{folder}'")]
    PersonalFolder { path: String, folder: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

impl From<PathValidationError> for ToolError {
    fn from(e: PathValidationError) -> Self {
        ToolError::PathNotAllowed(e.to_string())
    }
}

/// Validate that a path is safe to access.
///
/// Relative paths are resolved against `base_dir`. Returns the resolved
/// (canonical where possible) path on success.
pub fn validate_path(
    path: &str,
    base_dir: &Path,
    forbidden_paths: &[String],
) -> Result<PathBuf, PathValidationError> {
    let home = home_dir().map(PathBuf::from);
    validate_path_with_home(path, base_dir, forbidden_paths, home.as_deref())
}

pub(crate) fn validate_path_with_home(
    path: &str,
    base_dir: &Path,
    forbidden_paths: &[String],
    home: Option<&Path>,
) -> Result<PathBuf, PathValidationError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(PathValidationError::Empty);
    }

    let slashed = trimmed.replace('\\', "/");
    if slashed.split('/').any(|segment| segment == "..") {
        return Err(PathValidationError::PathTraversal { path: path.into() });
    }

    let expanded = expand_tilde(trimmed, home);
    let input_path = if expanded.is_absolute() || looks_like_windows_absolute(&slashed) {
        expanded
    } else {
        base_dir.join(expanded)
    };

    let resolved = resolve(&input_path).map_err(|reason| PathValidationError::CanonicalizeFailed {
        path: path.into(),
        reason,
    })?;
    let normalized = normalize(&resolved);

    if !SYSTEM_TEMP_EXCEPTIONS.iter().any(|t| has_prefix(&normalized, t))
        && let Some(dir) = SYSTEM_DIRS.iter().find(|d| has_prefix(&normalized, d))
    {
        return Err(PathValidationError::SystemDirectory {
            path: path.into(),
            dir: (*dir).into(),
        });
    }

    for forbidden in forbidden_paths {
        let pattern = normalize(&expand_tilde(forbidden, home));
        if has_prefix(&normalized, &pattern) {
            return Err(PathValidationError::ForbiddenPath {
                path: path.into(),
                pattern: forbidden.clone(),
            });
        }
    }

    if let Some(home) = home {
        let home_normalized = normalize(home);
        if let Some(rest) = strip_dir_prefix(&normalized, &home_normalized) {
            let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
            let is_temp = segments.iter().any(|s| TEMP_MARKERS.contains(s))
                || rest.starts_with("appdata/local/temp");
            if let Some(first) = segments.first()
                && PERSONAL_FOLDERS.contains(first)
                && !is_temp
            {
                return Err(PathValidationError::PersonalFolder {
                    path: path.into(),
                    folder: (*first).into(),
                });
            }
        }
    }

    Ok(resolved)
}

/// Whether a lowercase, forward-slash path lies inside a system directory.
pub fn is_system_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/").to_lowercase();
    SYSTEM_DIRS.iter().any(|d| has_prefix(&normalized, d))
}

/// Canonicalize if the path (or its parent, for new files) exists.
fn resolve(path: &Path) -> Result<PathBuf, String> {
    if path.exists() {
        return path.canonicalize().map_err(|e| e.to_string());
    }
    if let Some(parent) = path.parent()
        && parent.exists()
        && let Some(name) = path.file_name()
    {
        let parent = parent
            .canonicalize()
            .map_err(|e| format!("Parent dir: {e}"))?;
        return Ok(parent.join(name));
    }
    Ok(lexical_clean(path))
}

/// Drop `.` components without touching the filesystem.
fn lexical_clean(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn normalize(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/").to_lowercase();
    // canonicalize() on Windows adds the extended-length prefix
    let s = s.strip_prefix("//?/").unwrap_or(&s);
    let s = s.trim_end_matches('/');
    if s.is_empty() { "/".into() } else { s.to_string() }
}

fn has_prefix(path: &str, dir: &str) -> bool {
    strip_dir_prefix(path, dir).is_some()
}

/// `Some(rest)` if `path` equals `dir` or lies beneath it.
fn strip_dir_prefix<'a>(path: &'a str, dir: &str) -> Option<&'a str> {
    let dir = dir.trim_end_matches('/');
    let rest = path.strip_prefix(dir)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

fn looks_like_windows_absolute(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Expand ~ to the user's home directory.
fn expand_tilde(path: &str, home: Option<&Path>) -> PathBuf {
    if let Some(home) = home {
        if path == "~" {
            return home.to_path_buf();
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn home_dir() -> Option<String> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok()
    }
}
