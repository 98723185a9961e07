//! # File Store
//!
//! List, put, get, delete and move under the storage root. Every path
//! argument goes through the confiner first, and every outcome is written
//! to the audit log. Filesystem writes are not transactional: concurrent
//! writers to the same path race and the last one wins.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::confine::PathConfiner;
use super::errors::{StoreError, StoreResult};
use crate::observability::AuditLog;

/// Shape of `list` results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    /// Every file below the folder, at any depth
    Recursive,
    /// Immediate children only; directories end with `/`
    Shallow,
}

pub struct FileStore {
    confiner: PathConfiner,
    audit: Arc<AuditLog>,
    list_mode: ListMode,
}

impl FileStore {
    pub fn new(confiner: PathConfiner, audit: Arc<AuditLog>, list_mode: ListMode) -> Self {
        Self {
            confiner,
            audit,
            list_mode,
        }
    }

    pub fn root(&self) -> &Path {
        self.confiner.root()
    }

    pub fn list_mode(&self) -> ListMode {
        self.list_mode
    }

    /// Confine `raw`, recording `warning()` on escape.
    fn confine(&self, raw: &str, warning: impl FnOnce() -> String) -> StoreResult<PathBuf> {
        self.confiner.resolve(raw).map_err(|e| {
            self.audit.warning(warning());
            e
        })
    }

    fn reject_root(&self, path: &Path, raw: &str) -> StoreResult<()> {
        if path == self.confiner.root() {
            self.audit
                .warning(format!("Invalid file path attempted: {}", raw));
            return Err(StoreError::RootTarget(raw.to_string()));
        }
        Ok(())
    }

    fn io_failure(&self, operation: &str, target: &str, e: io::Error) -> StoreError {
        self.audit
            .error(format!("{} failed for {}: {}", operation, target, e));
        StoreError::Io(e.to_string())
    }

    /// List the confined folder (the root when `None`), paths relative to root.
    pub fn list(&self, folder: Option<&str>) -> StoreResult<Vec<String>> {
        let raw = folder.unwrap_or("");
        let dir = self.confine(raw, || format!("Invalid folder path attempted: {}", raw))?;

        if !dir.is_dir() {
            self.audit.warning(format!("Folder not found: {}", raw));
            return Err(StoreError::NotFound(raw.to_string()));
        }

        let mut entries = Vec::new();
        let walked = match self.list_mode {
            ListMode::Recursive => self.collect_files(&dir, &mut entries),
            ListMode::Shallow => self.collect_children(&dir, &mut entries),
        };
        walked.map_err(|e| self.io_failure("List", raw, e))?;
        entries.sort();

        match self.list_mode {
            ListMode::Recursive => self
                .audit
                .info(format!("Listed files: [{}]", entries.join(", "))),
            ListMode::Shallow => self.audit.info(format!(
                "Listed folder: {}",
                if raw.is_empty() { "/" } else { raw }
            )),
        }

        Ok(entries)
    }

    /// Where a directory entry really points, if it stays inside the root.
    /// Symlinks leaving the root are hidden from listings.
    fn confined_entry(&self, path: &Path) -> Option<(PathBuf, fs::Metadata)> {
        let rel = self.confiner.relative(path);
        let target = self.confiner.resolve(&rel).ok()?;
        let meta = fs::metadata(&target).ok()?;
        Some((target, meta))
    }

    fn collect_files(&self, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                self.collect_files(&path, out)?;
            } else if file_type.is_file() {
                out.push(self.confiner.relative(&path));
            } else if file_type.is_symlink() {
                // Linked files are listed; linked directories are not
                // descended, which keeps link cycles out of the walk.
                if let Some((_, meta)) = self.confined_entry(&path) {
                    if meta.is_file() {
                        out.push(self.confiner.relative(&path));
                    }
                }
            }
        }
        Ok(())
    }

    fn collect_children(&self, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;

            let is_dir = if file_type.is_symlink() {
                match self.confined_entry(&path) {
                    Some((_, meta)) => meta.is_dir(),
                    None => continue,
                }
            } else {
                file_type.is_dir()
            };

            let rel = self.confiner.relative(&path);
            out.push(if is_dir { format!("{}/", rel) } else { rel });
        }
        Ok(())
    }

    /// Write `data` as `filename` inside `folder`, creating folders as needed.
    /// An existing file is overwritten. Returns the path relative to root.
    pub fn put(&self, folder: Option<&str>, filename: &str, data: &[u8]) -> StoreResult<String> {
        let folder_raw = folder.unwrap_or("");
        let dir = self.confine(folder_raw, || {
            format!("Invalid folder path attempted: {}", folder_raw)
        })?;

        if filename.is_empty() {
            self.audit.warning("File name not provided for upload");
            return Err(StoreError::MissingParameter("file".to_string()));
        }

        let target_raw = if folder_raw.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", folder_raw, filename)
        };
        let target = self.confine(&target_raw, || {
            format!("Invalid file path attempted: {}", target_raw)
        })?;

        // The name may carry separators but must stay inside the folder.
        if target == dir || !target.starts_with(&dir) {
            self.audit
                .warning(format!("Invalid file path attempted: {}", target_raw));
            return Err(StoreError::PathEscape(target_raw));
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_failure("Upload", &target_raw, e))?;
        }
        fs::write(&target, data).map_err(|e| self.io_failure("Upload", &target_raw, e))?;

        let relative = self.confiner.relative(&target);
        self.audit.info(format!("Uploaded file: {}", relative));
        Ok(relative)
    }

    /// Read a confined file.
    pub fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let target = self.confine(path, || format!("Invalid file path attempted: {}", path))?;
        self.reject_root(&target, path)?;

        if !target.is_file() {
            self.audit.warning(format!("File not found: {}", path));
            return Err(StoreError::NotFound(path.to_string()));
        }

        let data = match fs::read(&target) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.audit.warning(format!("File not found: {}", path));
                return Err(StoreError::NotFound(path.to_string()));
            }
            Err(e) => return Err(self.io_failure("Download", path, e)),
        };

        self.audit.info(format!("Downloaded file: {}", path));
        Ok(data)
    }

    /// Remove a confined file. A symlink is removed itself, never its target.
    pub fn delete(&self, path: &str) -> StoreResult<()> {
        let target = self
            .confiner
            .resolve_entry(path)
            .map_err(|e| {
                self.audit
                    .warning(format!("Invalid file path attempted: {}", path));
                e
            })?;
        self.reject_root(&target, path)?;

        let removable = fs::symlink_metadata(&target)
            .map(|meta| meta.file_type().is_file() || meta.file_type().is_symlink())
            .unwrap_or(false);
        if !removable {
            self.audit
                .warning(format!("File not found for deletion: {}", path));
            return Err(StoreError::NotFound(path.to_string()));
        }

        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.audit
                    .warning(format!("File not found for deletion: {}", path));
                return Err(StoreError::NotFound(path.to_string()));
            }
            Err(e) => return Err(self.io_failure("Delete", path, e)),
        }

        self.audit.info(format!("Deleted file: {}", path));
        Ok(())
    }

    /// Move `source` to `destination`, creating the destination's folders.
    /// An existing directory as destination receives the source under its
    /// own name. Symlinks named by either side are moved or replaced
    /// themselves, never followed.
    pub fn rename(&self, source: &str, destination: Option<&str>) -> StoreResult<()> {
        let destination = match destination.filter(|d| !d.is_empty()) {
            Some(d) => d,
            None => {
                self.audit.warning("New name not provided for move");
                return Err(StoreError::MissingParameter("new_name".to_string()));
            }
        };

        let resolved = self
            .confiner
            .resolve_entry(source)
            .and_then(|from| Ok((from, self.confiner.resolve_entry(destination)?)));
        let (from, to) = match resolved {
            Ok(pair) => pair,
            Err(e) => {
                self.audit.warning(format!(
                    "Invalid path attempted: {} to {}",
                    source, destination
                ));
                return Err(e);
            }
        };
        self.reject_root(&from, source)?;
        self.reject_root(&to, destination)?;

        if fs::symlink_metadata(&from).is_err() {
            self.audit
                .warning(format!("File not found for move: {}", source));
            return Err(StoreError::NotFound(source.to_string()));
        }

        let to = match from.file_name() {
            Some(name) if to.is_dir() => {
                let inside = format!(
                    "{}/{}",
                    destination.trim_end_matches('/'),
                    name.to_string_lossy()
                );
                self.confiner.resolve_entry(&inside).map_err(|e| {
                    self.audit.warning(format!(
                        "Invalid path attempted: {} to {}",
                        source, destination
                    ));
                    e
                })?
            }
            _ => to,
        };

        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_failure("Move", source, e))?;
        }
        move_path(&from, &to).map_err(|e| self.io_failure("Move", source, e))?;

        self.audit
            .info(format!("Moved file from {} to {}", source, destination));
        Ok(())
    }
}

/// Rename, falling back to copy + remove for files when rename fails
/// (e.g. across devices).
fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if from.is_file() => {
            fs::copy(from, to).map_err(|_| e)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Severity;
    use tempfile::TempDir;

    fn store(mode: ListMode) -> (TempDir, Arc<AuditLog>, FileStore) {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::open(dir.path().join("logs/audit.txt")).unwrap());
        let confiner = PathConfiner::new(dir.path().join("uploads")).unwrap();
        let store = FileStore::new(confiner, audit.clone(), mode);
        (dir, audit, store)
    }

    fn last(audit: &AuditLog) -> (Severity, String) {
        let events = audit.snapshot();
        let e = events.last().unwrap();
        (e.severity(), e.message().to_string())
    }

    #[test]
    fn test_put_then_get() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        let rel = store.put(Some("reports"), "a.pdf", b"%PDF-1.4").unwrap();
        assert_eq!(rel, "reports/a.pdf");
        assert_eq!(last(&audit), (Severity::Info, "Uploaded file: reports/a.pdf".into()));

        assert_eq!(store.get("reports/a.pdf").unwrap(), b"%PDF-1.4");
        assert_eq!(last(&audit), (Severity::Info, "Downloaded file: reports/a.pdf".into()));
    }

    #[test]
    fn test_put_overwrites() {
        let (_dir, _audit, store) = store(ListMode::Shallow);
        store.put(None, "a.txt", b"one").unwrap();
        store.put(None, "a.txt", b"two").unwrap();
        assert_eq!(store.get("a.txt").unwrap(), b"two");
    }

    #[test]
    fn test_put_rejects_escaping_folder() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        let err = store.put(Some("../elsewhere"), "a.txt", b"x").unwrap_err();
        assert!(matches!(err, StoreError::PathEscape(_)));
        assert_eq!(
            last(&audit),
            (Severity::Warning, "Invalid folder path attempted: ../elsewhere".into())
        );
    }

    #[test]
    fn test_put_rejects_filename_leaving_folder() {
        let (dir, _audit, store) = store(ListMode::Shallow);
        assert!(store.put(Some("reports"), "../x.txt", b"x").is_err());
        assert!(store.put(None, "../../x.txt", b"x").is_err());
        assert!(store.put(None, "..", b"x").is_err());
        assert!(!dir.path().join("x.txt").exists());
    }

    #[test]
    fn test_put_requires_filename() {
        let (_dir, _audit, store) = store(ListMode::Shallow);
        assert!(matches!(
            store.put(None, "", b"x"),
            Err(StoreError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_shallow_list_marks_directories() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        store.put(Some("reports"), "a.pdf", b"a").unwrap();
        store.put(Some("reports/2024"), "b.pdf", b"b").unwrap();
        store.put(None, "top.txt", b"t").unwrap();

        assert_eq!(store.list(None).unwrap(), vec!["reports/", "top.txt"]);
        assert_eq!(store.list(Some("reports")).unwrap(), vec!["reports/2024/", "reports/a.pdf"]);
        assert_eq!(last(&audit), (Severity::Info, "Listed folder: reports".into()));
    }

    #[test]
    fn test_recursive_list_walks_tree() {
        let (_dir, audit, store) = store(ListMode::Recursive);
        store.put(Some("reports"), "a.pdf", b"a").unwrap();
        store.put(Some("reports/2024"), "b.pdf", b"b").unwrap();
        store.put(None, "top.txt", b"t").unwrap();

        assert_eq!(
            store.list(None).unwrap(),
            vec!["reports/2024/b.pdf", "reports/a.pdf", "top.txt"]
        );
        assert_eq!(store.list(Some("reports/2024")).unwrap(), vec!["reports/2024/b.pdf"]);
        assert_eq!(
            last(&audit),
            (Severity::Info, "Listed files: [reports/2024/b.pdf]".into())
        );
    }

    #[test]
    fn test_list_missing_folder_is_not_found() {
        let (_dir, _audit, store) = store(ListMode::Shallow);
        assert!(matches!(store.list(Some("nope")), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_list_escape_rejected() {
        let (_dir, _audit, store) = store(ListMode::Recursive);
        assert!(matches!(store.list(Some("..")), Err(StoreError::PathEscape(_))));
    }

    #[test]
    fn test_delete_twice() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        store.put(None, "a.txt", b"x").unwrap();
        store.delete("a.txt").unwrap();
        assert_eq!(last(&audit), (Severity::Info, "Deleted file: a.txt".into()));

        assert!(matches!(store.delete("a.txt"), Err(StoreError::NotFound(_))));
        assert_eq!(
            last(&audit),
            (Severity::Warning, "File not found for deletion: a.txt".into())
        );
    }

    #[test]
    fn test_root_is_never_a_file_operand() {
        let (_dir, _audit, store) = store(ListMode::Shallow);
        assert!(matches!(store.get(""), Err(StoreError::RootTarget(_))));
        assert!(matches!(store.delete("."), Err(StoreError::RootTarget(_))));
        store.put(None, "a.txt", b"x").unwrap();
        assert!(matches!(store.rename("a.txt", Some(".")), Err(StoreError::RootTarget(_))));
        assert!(matches!(store.rename("sub/..", Some("b")), Err(StoreError::RootTarget(_))));
    }

    #[test]
    fn test_get_directory_is_not_found() {
        let (_dir, _audit, store) = store(ListMode::Shallow);
        store.put(Some("reports"), "a.pdf", b"a").unwrap();
        assert!(matches!(store.get("reports"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_rename_moves_content() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        store.put(Some("in"), "a.txt", b"payload").unwrap();

        store.rename("in/a.txt", Some("archive/2024/a.txt")).unwrap();
        assert_eq!(
            last(&audit),
            (Severity::Info, "Moved file from in/a.txt to archive/2024/a.txt".into())
        );
        assert_eq!(store.get("archive/2024/a.txt").unwrap(), b"payload");
        assert!(matches!(store.get("in/a.txt"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_rename_into_existing_directory() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        store.put(None, "a.txt", b"payload").unwrap();
        store.put(Some("archive"), "old.txt", b"o").unwrap();

        store.rename("a.txt", Some("archive")).unwrap();
        assert_eq!(store.get("archive/a.txt").unwrap(), b"payload");
        assert_eq!(store.get("archive/old.txt").unwrap(), b"o");
        assert_eq!(
            last(&audit),
            (Severity::Info, "Moved file from a.txt to archive".into())
        );
    }

    #[test]
    fn test_rename_under_regular_file_is_io_failure() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        store.put(None, "a.txt", b"a").unwrap();
        store.put(None, "b.txt", b"b").unwrap();

        let err = store.rename("a.txt", Some("b.txt/c.txt")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(err.status_code(), 500);

        let (severity, message) = last(&audit);
        assert_eq!(severity, Severity::Error);
        assert!(message.starts_with("Move failed for a.txt: "), "{}", message);
        assert_eq!(store.get("a.txt").unwrap(), b"a");
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_and_move_act_on_the_link() {
        let (_dir, _audit, store) = store(ListMode::Shallow);
        store.put(None, "real.txt", b"r").unwrap();
        std::os::unix::fs::symlink(store.root().join("real.txt"), store.root().join("alias"))
            .unwrap();

        store.rename("alias", Some("moved-alias")).unwrap();
        assert!(fs::symlink_metadata(store.root().join("moved-alias"))
            .unwrap()
            .file_type()
            .is_symlink());
        assert_eq!(store.get("real.txt").unwrap(), b"r");

        store.delete("moved-alias").unwrap();
        assert!(fs::symlink_metadata(store.root().join("moved-alias")).is_err());
        assert_eq!(store.get("real.txt").unwrap(), b"r");
    }

    #[cfg(unix)]
    #[test]
    fn test_link_leaving_root_can_be_deleted_without_touching_target() {
        let (dir, _audit, store) = store(ListMode::Shallow);
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, b"keep").unwrap();
        std::os::unix::fs::symlink(&outside, store.root().join("escape")).unwrap();

        assert!(matches!(store.get("escape"), Err(StoreError::PathEscape(_))));
        store.delete("escape").unwrap();
        assert_eq!(fs::read(&outside).unwrap(), b"keep");
    }

    #[test]
    fn test_rename_requires_destination() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        assert!(matches!(store.rename("a.txt", None), Err(StoreError::MissingParameter(_))));
        assert!(matches!(store.rename("a.txt", Some("")), Err(StoreError::MissingParameter(_))));
        assert_eq!(last(&audit), (Severity::Warning, "New name not provided for move".into()));
    }

    #[test]
    fn test_rename_confines_both_sides() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        store.put(None, "a.txt", b"x").unwrap();

        assert!(matches!(store.rename("a.txt", Some("../a.txt")), Err(StoreError::PathEscape(_))));
        assert_eq!(
            last(&audit),
            (Severity::Warning, "Invalid path attempted: a.txt to ../a.txt".into())
        );
        assert!(matches!(store.rename("../a.txt", Some("b.txt")), Err(StoreError::PathEscape(_))));
        assert_eq!(store.get("a.txt").unwrap(), b"x");
    }

    #[test]
    fn test_rename_missing_source() {
        let (_dir, audit, store) = store(ListMode::Shallow);
        assert!(matches!(store.rename("ghost.txt", Some("b.txt")), Err(StoreError::NotFound(_))));
        assert_eq!(last(&audit), (Severity::Warning, "File not found for move: ghost.txt".into()));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_hides_links_out_of_root() {
        let (dir, _audit, store) = store(ListMode::Shallow);
        let outside = dir.path().join("outside");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("secret.txt"), b"s").unwrap();
        std::os::unix::fs::symlink(&outside, store.root().join("escape")).unwrap();
        store.put(None, "visible.txt", b"v").unwrap();

        assert_eq!(store.list(None).unwrap(), vec!["visible.txt"]);
    }
}
