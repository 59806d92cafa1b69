//! Symlink management for worker workspaces

use crate::error::{PipelineError, Result};
use std::path::Path;
use tracing::{debug, trace};

#[cfg(unix)]
use std::os::unix::fs::symlink;
#[cfg(windows)]
use std::os::windows::fs::symlink_file as symlink;

/// What [`link_file`] did to make `link` point at `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A new link was created
    Created,
    /// A link or file already at `link` was removed and relinked
    Replaced,
    /// `link` already pointed at `target`
    AlreadyLinked,
    /// `link` and `target` are the same path
    SamePath,
}

/// Make `link` a symlink to `target`, creating intermediate directories.
///
/// A link already pointing at `target` is left alone; anything else at `link`
/// is removed and relinked.
pub fn link_file(target: &Path, link: &Path) -> Result<LinkOutcome> {
    if std::path::absolute(target)? == std::path::absolute(link)? {
        trace!("{} is already in place", link.display());
        return Ok(LinkOutcome::SamePath);
    }

    if let Some(parent) = link.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let outcome = match std::fs::symlink_metadata(link) {
        Ok(meta) => {
            if meta.file_type().is_symlink() && std::fs::read_link(link)? == target {
                return Ok(LinkOutcome::AlreadyLinked);
            }
            debug!("Replacing {} with link to {}", link.display(), target.display());
            std::fs::remove_file(link)?;
            LinkOutcome::Replaced
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => LinkOutcome::Created,
        Err(e) => return Err(e.into()),
    };

    match symlink(target, link) {
        Ok(()) => Ok(outcome),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            // Lost a race with another linker; one retry after clearing the path.
            std::fs::remove_file(link)?;
            symlink(target, link)?;
            Ok(LinkOutcome::Replaced)
        }
        Err(e) => Err(e.into()),
    }
}

/// Create `link` pointing at `target` only when nothing exists at `link` yet
pub fn link_if_absent(target: &Path, link: &Path) -> Result<bool> {
    if std::fs::symlink_metadata(link).is_ok() {
        return Ok(false);
    }
    link_file(target, link)?;
    Ok(true)
}

/// Remove a product left at `path` by an earlier simulation.
///
/// Symlinks are removed, never followed. Returns whether anything was there.
pub fn remove_stale(path: &Path) -> Result<bool> {
    let removed = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => Err(e),
    };
    removed.map_err(|e| PipelineError::workspace(path, e))?;
    debug!("Removed stale {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_link_created_then_already_linked() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let target = dir.path().join("source.xml");
        std::fs::write(&target, "<p/>")?;
        let link = dir.path().join("worker").join("data").join("source.xml");

        assert_eq!(link_file(&target, &link)?, LinkOutcome::Created);
        assert_eq!(link_file(&target, &link)?, LinkOutcome::AlreadyLinked);
        assert_eq!(std::fs::read_link(&link)?, target);
        Ok(())
    }

    #[test]
    fn test_changed_target_is_replaced() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let old = dir.path().join("old.fits");
        let new = dir.path().join("new.fits");
        std::fs::write(&old, "old")?;
        std::fs::write(&new, "new")?;
        let link = dir.path().join("link.fits");

        link_file(&old, &link)?;
        assert_eq!(link_file(&new, &link)?, LinkOutcome::Replaced);
        assert_eq!(std::fs::read_to_string(&link)?, "new");
        Ok(())
    }

    #[test]
    fn test_regular_file_is_replaced() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let target = dir.path().join("t.txt");
        std::fs::write(&target, "target")?;
        let link = dir.path().join("l.txt");
        std::fs::write(&link, "stale copy")?;

        assert_eq!(link_file(&target, &link)?, LinkOutcome::Replaced);
        assert!(std::fs::symlink_metadata(&link)?.file_type().is_symlink());
        Ok(())
    }

    #[test]
    fn test_same_path_is_noop() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x")?;
        assert_eq!(link_file(&file, &file)?, LinkOutcome::SamePath);
        assert!(!std::fs::symlink_metadata(&file)?.file_type().is_symlink());
        Ok(())
    }

    #[test]
    fn test_link_if_absent_keeps_existing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, "a")?;
        std::fs::write(&b, "b")?;
        let link = dir.path().join("cache.bin");

        assert!(link_if_absent(&a, &link)?);
        assert!(!link_if_absent(&b, &link)?);
        assert_eq!(std::fs::read_to_string(&link)?, "a");
        Ok(())
    }

    #[test]
    fn test_remove_stale_keeps_link_target() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let target = dir.path().join("shared.fits");
        std::fs::write(&target, "shared")?;
        let link = dir.path().join("worker/data/shared.fits");
        link_file(&target, &link)?;

        assert!(remove_stale(&link)?);
        assert!(std::fs::symlink_metadata(&link).is_err());
        assert!(target.exists());
        assert!(!remove_stale(&link)?);
        Ok(())
    }

    #[test]
    fn test_remove_stale_product_directory() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let product = dir.path().join("data/images");
        std::fs::create_dir_all(&product)?;
        std::fs::write(product.join("image_0.fits"), "old")?;

        assert!(remove_stale(&product)?);
        assert!(!product.exists());
        Ok(())
    }
}
