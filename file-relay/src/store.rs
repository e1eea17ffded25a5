//! Local filesystem store for one node's storage root.
//!
//! A [`Store`] owns a single directory tree.  All paths it accepts are
//! [`StoragePath`]s, so nothing outside the root is reachable.  Writes go to
//! a hidden temporary file next to the target and are renamed into place, so
//! a listing never shows a partially written file.

use std::path::{Path, PathBuf};

use rand::Rng;
use walkdir::WalkDir;

use crate::classify::FileClass;
use crate::error::{Error, ValidationError};
use crate::path::StoragePath;

/// Filesystem operations scoped to one storage root.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if it is missing, readable by the owning user only.
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        if tokio::fs::metadata(&self.root).await.is_ok() {
            return Ok(());
        }
        tokio::fs::create_dir_all(&self.root).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700)).await?;
        }
        log::info!("[store] created storage root {}", self.root.display());
        Ok(())
    }

    /// Atomically replace the file at `path` with `bytes`, creating
    /// intermediate directories.  Concurrent writers to the same path race;
    /// the last rename wins.
    pub async fn write(&self, path: &StoragePath, bytes: &[u8]) -> Result<(), Error> {
        if path.is_root() {
            return Err(ValidationError::MissingFileName(path.to_string()).into());
        }
        let target = path.resolve(&self.root);
        let dir = target.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let suffix: u64 = rand::thread_rng().gen();
        let temp = dir.join(format!(".partial-{suffix:016x}"));
        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        log::debug!("[store] wrote {} ({} bytes)", target.display(), bytes.len());
        Ok(())
    }

    pub async fn read(&self, path: &StoragePath) -> Result<Vec<u8>, Error> {
        let target = path.resolve(&self.root);
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ValidationError::NotFound(path.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, path: &StoragePath) -> Result<(), Error> {
        let target = path.resolve(&self.root);
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(ValidationError::NotFound(path.to_string()).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ValidationError::NotFound(path.to_string()).into());
            }
            Err(e) => return Err(e.into()),
        }
        tokio::fs::remove_file(&target).await?;
        log::debug!("[store] removed {}", target.display());
        Ok(())
    }

    /// Root-relative paths of every `class` file at or below `dir`, sorted.
    /// A directory that does not exist here lists as empty.
    pub async fn list(&self, dir: &StoragePath, class: FileClass) -> Result<Vec<String>, Error> {
        let root = self.root.clone();
        let base = dir.resolve(&root);
        let entries = blocking(move || {
            if !base.exists() {
                return Ok(Vec::new());
            }
            let mut entries = Vec::new();
            for (_, rel) in class_files(&root, &base, class)? {
                entries.push(rel);
            }
            entries.sort();
            Ok(entries)
        })
        .await?;
        Ok(entries)
    }

    /// Every `class` file under the root packed into one tar archive.
    pub async fn archive(&self, class: FileClass) -> Result<Vec<u8>, Error> {
        let root = self.root.clone();
        let bytes = blocking(move || {
            let mut builder = tar::Builder::new(Vec::new());
            let mut count = 0usize;
            for (path, rel) in class_files(&root, &root, class)? {
                builder.append_path_with_name(&path, &rel)?;
                count += 1;
            }
            log::debug!("[store] archived {count} {class} file(s)");
            builder.into_inner()
        })
        .await?;
        Ok(bytes)
    }
}

/// Walk `base` and return `(absolute, root-relative)` pairs of regular files
/// whose name classifies as `class`.
fn class_files(root: &Path, base: &Path, class: FileClass) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(base).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if FileClass::of(&name) != class {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((entry.path().to_path_buf(), rel));
    }
    Ok(files)
}

/// Run blocking filesystem work off the async runtime.
async fn blocking<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}
