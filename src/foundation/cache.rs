use std::path::{Path, PathBuf};

use crate::foundation::error::{AssetError, AssetResult};

/// Directory every generated artifact is written to.
///
/// The default location is scoped to the current process so concurrent processes never share
/// intermediate files.
#[derive(Clone, Debug)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn process_scoped() -> Self {
        Self {
            root: std::env::temp_dir().join(format!("framecast-{}", std::process::id())),
        }
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> AssetResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            AssetError::output_location(format!(
                "failed to create cache directory '{}': {e}",
                self.root.display()
            ))
        })
    }

    /// `<root>/<name>`, with any previous file at that path removed (overwrite semantics).
    pub fn fresh_path(&self, name: &str) -> AssetResult<PathBuf> {
        self.ensure()?;
        let path = self.root.join(name);
        remove_if_exists(&path)?;
        Ok(path)
    }

    /// A collision-free `<root>/<prefix>-<uuid>.<ext>` path.
    pub fn unique_path(&self, prefix: &str, ext: &str) -> AssetResult<PathBuf> {
        let id = uuid::Uuid::new_v4().simple();
        self.fresh_path(&format!("{prefix}-{id}.{ext}"))
    }
}

impl Default for CacheDir {
    fn default() -> Self {
        Self::process_scoped()
    }
}

/// Delete `path` if it exists. Missing files are not an error.
pub fn remove_if_exists(path: &Path) -> AssetResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AssetError::output_location(format!(
            "failed to remove stale file '{}': {e}",
            path.display()
        ))),
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> AssetResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/cache.rs"]
mod tests;
