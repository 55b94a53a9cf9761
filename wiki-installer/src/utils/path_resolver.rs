// Install-root path resolution
//
// Every operator-supplied path is resolved against the install root and must stay inside it.

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const DATA_DIRECTORY_TOKEN: &str = "|DataDirectory|";
pub const DATA_DIRECTORY_NAME: &str = "App_Data";
const LOG_FOLDER_NAME: &str = "Installer_Logs";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathResolveError {
    #[error("Path is empty")]
    Empty,
    #[error("Path '{0}' resolves outside the install root")]
    OutsideRoot(String),
}

/// Resolve the install root (absolute path).
///
/// An explicit override wins; otherwise the folder the executable runs from, then the CWD.
pub fn resolve_install_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let root = match explicit {
        Some(p) => p.to_path_buf(),
        None => std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))),
    };

    if root.is_absolute() {
        return Ok(normalize(&root).unwrap_or(root));
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let joined = cwd.join(&root);
    Ok(normalize(&joined).unwrap_or(joined))
}

/// Resolve (and create) the installer log folder under the install root.
pub fn resolve_log_folder(install_root: &Path) -> Result<PathBuf> {
    let log_dir = install_root.join(DATA_DIRECTORY_NAME).join(LOG_FOLDER_NAME);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log folder {:?}", log_dir))?;
    Ok(log_dir)
}

pub fn data_directory(install_root: &Path) -> PathBuf {
    install_root.join(DATA_DIRECTORY_NAME)
}

/// Resolve an operator path against the install root.
///
/// `~/x` and `x` both mean `<root>/x`. Absolute paths are accepted only inside the root.
/// Any `..` that climbs out of the root is rejected.
pub fn resolve_under_root(install_root: &Path, raw: &str) -> Result<PathBuf, PathResolveError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathResolveError::Empty);
    }

    let unified = trimmed.replace('\\', "/");
    let relative = unified
        .strip_prefix("~/")
        .or_else(|| (unified == "~").then_some(""))
        .unwrap_or(unified.as_str());

    let root = normalize(install_root).unwrap_or_else(|| install_root.to_path_buf());
    let candidate = if Path::new(relative).is_absolute() {
        PathBuf::from(relative)
    } else {
        root.join(relative)
    };

    match normalize(&candidate) {
        Some(resolved) if resolved.starts_with(&root) => Ok(resolved),
        _ => Err(PathResolveError::OutsideRoot(trimmed.to_string())),
    }
}

/// Expand `|DataDirectory|` (case-insensitive) to `<root>/App_Data/`.
pub fn expand_data_directory(conn_str: &str, install_root: &Path) -> String {
    let lowered = conn_str.to_ascii_lowercase();
    let token = DATA_DIRECTORY_TOKEN.to_ascii_lowercase();
    let Some(start) = lowered.find(&token) else {
        return conn_str.to_string();
    };

    let rest = conn_str[start + token.len()..].trim_start_matches(['/', '\\']);
    let dir = data_directory(install_root);
    format!("{}{}/{}", &conn_str[..start], dir.display(), rest)
}

/// Lexical normalization: folds `.` and `..` without touching the filesystem.
/// Returns `None` if `..` climbs above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/wiki")
    }

    #[test]
    fn tilde_and_relative_paths_land_under_root() {
        assert_eq!(
            resolve_under_root(&root(), "~/App_Data/Attachments"),
            Ok(PathBuf::from("/srv/wiki/App_Data/Attachments"))
        );
        assert_eq!(
            resolve_under_root(&root(), "uploads"),
            Ok(PathBuf::from("/srv/wiki/uploads"))
        );
        assert_eq!(
            resolve_under_root(&root(), "~\\files\\a"),
            Ok(PathBuf::from("/srv/wiki/files/a"))
        );
        assert_eq!(resolve_under_root(&root(), "~"), Ok(PathBuf::from("/srv/wiki")));
    }

    #[test]
    fn absolute_paths_must_stay_inside_root() {
        assert_eq!(
            resolve_under_root(&root(), "/srv/wiki/att"),
            Ok(PathBuf::from("/srv/wiki/att"))
        );
        assert!(matches!(
            resolve_under_root(&root(), "/etc"),
            Err(PathResolveError::OutsideRoot(_))
        ));
        assert!(matches!(
            resolve_under_root(&root(), "/srv/wikiother"),
            Err(PathResolveError::OutsideRoot(_))
        ));
    }

    #[test]
    fn parent_escapes_are_rejected() {
        assert!(matches!(
            resolve_under_root(&root(), "~/../../etc/passwd"),
            Err(PathResolveError::OutsideRoot(_))
        ));
        assert_eq!(
            resolve_under_root(&root(), "a/../b"),
            Ok(PathBuf::from("/srv/wiki/b"))
        );
        assert_eq!(resolve_under_root(&root(), "  "), Err(PathResolveError::Empty));
    }

    #[test]
    fn data_directory_token_expands_under_root() {
        assert_eq!(
            expand_data_directory("Data Source=|DataDirectory|\\wiki.db", &root()),
            "Data Source=/srv/wiki/App_Data/wiki.db"
        );
        assert_eq!(
            expand_data_directory("sqlite:|datadirectory|wiki.db", &root()),
            "sqlite:/srv/wiki/App_Data/wiki.db"
        );
        assert_eq!(expand_data_directory("Server=db", &root()), "Server=db");
    }

    #[test]
    fn log_folder_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let logs = resolve_log_folder(dir.path()).expect("log folder");
        assert!(logs.is_dir());
        assert!(logs.starts_with(dir.path()));
    }
}
