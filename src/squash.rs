//! Rootfs reconstruction: replay each layer's tar on top of an accumulating
//! target directory, applying whiteout deletions as they're found.

use crate::archive::{self, WHITEOUT_OPAQUE, WHITEOUT_PREFIX};
use crate::error::{Error, Result};
use crate::model::Image;
use std::path::{Path, PathBuf};

/// Returns `true` if `name` (a bare file name, not a path) is a whiteout
/// marker of either kind.
pub fn is_whiteout_marker(name: &str) -> bool {
    name == WHITEOUT_OPAQUE || name.starts_with(WHITEOUT_PREFIX)
}

/// Given a whiteout marker's path relative to a layer root, returns the path
/// (also layer-relative) it marks for deletion: the marker's parent
/// directory itself for an opaque marker, or the sibling with the `.wh.`
/// prefix stripped for an explicit one.
pub fn whiteable_path_for(marker_path: &Path) -> Option<PathBuf> {
    let name = marker_path.file_name()?.to_str()?;
    let parent = marker_path.parent().unwrap_or_else(|| Path::new(""));
    if name == WHITEOUT_OPAQUE {
        Some(parent.to_path_buf())
    } else {
        let real_name = name.strip_prefix(WHITEOUT_PREFIX)?;
        Some(parent.join(real_name))
    }
}

/// Replays every layer of `image` bottom to top into `target_dir`, which is
/// created if it doesn't already exist. Returns the whiteable path of every
/// whiteout marker encountered over the whole replay (relative to
/// `target_dir`), in the order they were applied, whether or not the path
/// existed in `target_dir` at the time.
///
/// Each layer is extracted into a fresh temporary directory first; whiteouts
/// found there are applied against `target_dir` (deleting both the marked
/// path and the marker itself from the temp copy) before the remaining temp
/// content is copied/overwritten into `target_dir`. A whiteout referencing a
/// path that doesn't exist in `target_dir` is not an error.
pub fn rebuild_rootfs(image: &Image, target_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(target_dir).map_err(|e| Error::io(target_dir, e))?;
    let mut deletions = Vec::new();

    for layer in &image.layers {
        let temp_dir = tempfile::tempdir().map_err(|e| Error::io(target_dir, e))?;
        let layer_root = temp_dir.path();

        let events = archive::extract_tar(&layer.archive_location, layer_root, false)?;

        for event in &events {
            if let crate::archive::ExtractEvent::WhiteoutMarker { archive_path, opaque } = event {
                let marker_rel = PathBuf::from(archive_path.trim_start_matches('/'));
                let Some(whiteable) = whiteable_path_for(&marker_rel) else {
                    continue;
                };
                let target_path = target_dir.join(&whiteable);
                if target_path.exists() {
                    if *opaque {
                        clear_dir_contents(&target_path)?;
                    } else {
                        remove_path(&target_path)?;
                    }
                }
                deletions.push(whiteable.clone());
            }
        }

        copy_merge(layer_root, target_dir)?;
    }

    Ok(deletions)
}

fn clear_dir_contents(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?.flatten() {
        let path = entry.path();
        remove_path(&path)?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(_) => return Ok(()),
    };
    if meta.is_dir() && !meta.is_symlink() {
        std::fs::remove_dir_all(path).map_err(|e| Error::io(path, e))
    } else {
        std::fs::remove_file(path).map_err(|e| Error::io(path, e))
    }
}

/// Recursively copies `source` into `target`, overwriting any existing
/// entries of the same relative path.
fn copy_merge(source: &Path, target: &Path) -> Result<()> {
    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            Error::io(source, std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        let src_path = entry.path();
        if src_path == source {
            continue;
        }
        let rel = src_path
            .strip_prefix(source)
            .expect("walkdir entries are always under their root");
        let dest_path = target.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&dest_path).map_err(|e| Error::io(&dest_path, e))?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        remove_path(&dest_path)?;

        if file_type.is_symlink() {
            let link_target = std::fs::read_link(src_path).map_err(|e| Error::io(src_path, e))?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_target, &dest_path)
                .map_err(|e| Error::io(&dest_path, e))?;
            #[cfg(not(unix))]
            log::warn!("symlink support unavailable on this platform: {}", dest_path.display());
        } else {
            std::fs::copy(src_path, &dest_path).map_err(|e| Error::io(&dest_path, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whiteable_path_explicit_marker() {
        let p = whiteable_path_for(Path::new("etc/.wh.hosts")).unwrap();
        assert_eq!(p, PathBuf::from("etc/hosts"));
    }

    #[test]
    fn whiteable_path_opaque_marker() {
        let p = whiteable_path_for(Path::new("var/cache/.wh..wh..opq")).unwrap();
        assert_eq!(p, PathBuf::from("var/cache"));
    }

    #[test]
    fn is_whiteout_marker_matches_both_kinds() {
        assert!(is_whiteout_marker(".wh..wh..opq"));
        assert!(is_whiteout_marker(".wh.foo"));
        assert!(!is_whiteout_marker("foo"));
    }
}
