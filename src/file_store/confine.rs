//! # Path Confinement
//!
//! Resolves untrusted relative paths against the storage root.
//!
//! Resolution walks the candidate one component at a time starting from the
//! canonical root: `.` is skipped, `..` pops, and every existing symlink is
//! replaced by its canonical target. The result is accepted only when it is
//! the root or lies below it by whole path components, so `/data/store-evil`
//! never passes for `/data/store`.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::errors::{StoreError, StoreResult};

/// Resolve `raw` against a canonical `root`.
///
/// `root` must already be canonical (see [`PathConfiner::new`]); the
/// boundary check compares against it verbatim.
pub fn resolve(root: &Path, raw: &str) -> StoreResult<PathBuf> {
    let candidate = Path::new(raw);
    let escape = || StoreError::PathEscape(raw.to_string());

    let mut resolved = if candidate.has_root() {
        PathBuf::new()
    } else {
        root.to_path_buf()
    };

    for component in candidate.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                let is_symlink = fs::symlink_metadata(&resolved)
                    .map(|meta| meta.file_type().is_symlink())
                    .unwrap_or(false);
                if is_symlink {
                    // A dangling link cannot be verified, so it is refused.
                    resolved = fs::canonicalize(&resolved).map_err(|_| escape())?;
                }
            }
        }
    }

    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(escape())
    }
}

/// Resolve `raw` like [`resolve`], but leave a symlink in the final
/// component in place so the caller acts on the link rather than its target.
pub fn resolve_entry(root: &Path, raw: &str) -> StoreResult<PathBuf> {
    let candidate = Path::new(raw);
    match candidate.components().next_back() {
        Some(Component::Normal(name)) => {
            let parent = candidate
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dir = resolve(root, &parent).map_err(|_| StoreError::PathEscape(raw.to_string()))?;
            Ok(dir.join(name))
        }
        _ => resolve(root, raw),
    }
}

/// The storage root plus the confinement rule.
#[derive(Debug, Clone)]
pub struct PathConfiner {
    root: PathBuf,
}

impl PathConfiner {
    /// Create the root if absent and pin its canonical form.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client path to an absolute path inside the root.
    pub fn resolve(&self, raw: &str) -> StoreResult<PathBuf> {
        resolve(&self.root, raw)
    }

    /// Resolve a client path naming an entry to remove or move.
    pub fn resolve_entry(&self, raw: &str) -> StoreResult<PathBuf> {
        resolve_entry(&self.root, raw)
    }

    /// Render a confined path relative to the root with `/` separators.
    /// The root itself renders as the empty string.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
