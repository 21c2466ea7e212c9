//! Safe tar extraction and the whiteout markers it recognizes.
//!
//! Whiteout *detection* lives here (an entry named `.wh.<name>` or
//! `.wh..wh..opq` is recognized and never written to disk as a regular
//! file) but whiteout *application* against an accumulating rootfs is the
//! squasher's job (see [`crate::squash`]) — this module only extracts one
//! layer's tar into one fresh directory.

use crate::digest::sha256_digest_reader;
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

pub const WHITEOUT_OPAQUE: &str = ".wh..wh..opq";
pub const WHITEOUT_PREFIX: &str = ".wh.";

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractEvent {
    /// A path escaping the archive root via `..` was rejected; the entry was
    /// skipped entirely.
    PathEscape { archive_path: String },
    /// A tar entry's path was absolute; it was rewritten relative to the
    /// extraction root.
    AbsolutePathRewritten { archive_path: String },
    /// A device, fifo, or other non-regular/-dir/-link entry was skipped.
    DeviceSkipped { archive_path: String },
    /// A hardlink whose target never appeared in the archive was skipped.
    BrokenHardlink { archive_path: String, target: String },
    /// A symlink could not be created (e.g. unsupported platform) and whose
    /// target could not be found to fall back to a copy.
    BrokenSymlink { archive_path: String, target: String },
    /// `.wh.<name>` or `.wh..wh..opq` encountered; recorded so a caller that
    /// only sees the returned events can still follow what layer content was
    /// marked for deletion.
    WhiteoutMarker { archive_path: String, opaque: bool },
}

/// Computes the sha256 digest of a (possibly gzip-compressed) tar archive's
/// raw bytes, without extracting it.
pub fn sha256_digest_of_file(path: &Path) -> Result<crate::digest::Digest> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    sha256_digest_reader(file).map_err(|e| Error::io(path, e))
}

fn is_gzip(path: &Path) -> Result<bool> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut magic = [0u8; 2];
    match reader.read_exact(&mut magic) {
        Ok(()) => Ok(magic == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn open_archive(path: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    if is_gzip(path)? {
        Ok(tar::Archive::new(Box::new(GzDecoder::new(file))))
    } else {
        Ok(tar::Archive::new(Box::new(file)))
    }
}

/// Normalizes a tar entry path, returning `None` if it tries to escape the
/// extraction root via a leading or embedded `..`. Absolute paths and
/// Windows-style prefixes are stripped rather than rejected, since they are
/// common (if sloppy) in real-world layer tarballs and don't escape the
/// target directory once the root component is dropped.
fn normalize_entry_path(p: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => return None,
            Component::Normal(c) => out.push(c),
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    Some(out)
}

/// Pushes `event` onto `events` and mirrors it through the `log` facade at a
/// level matching its severity, so a caller that discards the returned `Vec`
/// still gets visibility into non-fatal extraction anomalies.
fn record(events: &mut Vec<ExtractEvent>, event: ExtractEvent) {
    match &event {
        ExtractEvent::PathEscape { archive_path } => {
            log::warn!("rejected path escaping archive root: {archive_path}");
        }
        ExtractEvent::AbsolutePathRewritten { archive_path } => {
            log::debug!("rewrote absolute path as relative: {archive_path}");
        }
        ExtractEvent::DeviceSkipped { archive_path } => {
            log::debug!("skipped non-regular entry: {archive_path}");
        }
        ExtractEvent::BrokenHardlink { archive_path, target } => {
            log::warn!("hardlink {archive_path} -> {target} never resolved");
        }
        ExtractEvent::BrokenSymlink { archive_path, target } => {
            log::warn!("symlink {archive_path} -> {target} could not be created or copied");
        }
        ExtractEvent::WhiteoutMarker { archive_path, opaque } => {
            log::debug!("whiteout marker ({}): {archive_path}", if *opaque { "opaque" } else { "explicit" });
        }
    }
    events.push(event);
}

struct PendingHardlink {
    dest: PathBuf,
    target: PathBuf,
    archive_path: String,
}

struct PendingSymlink {
    dest: PathBuf,
    target: PathBuf,
    archive_path: String,
}

/// Extracts one layer tarball (plain or gzip) into `extract_dir`, which must
/// already exist and be empty. Whiteout markers are recognized and reported
/// via [`ExtractEvent::WhiteoutMarker`] but are not written to disk as
/// regular files; they are not deleted from disk either, since this function
/// has no notion of the rootfs they apply against.
///
/// When `skip_symlinks` is set, symlink entries are recorded as
/// [`ExtractEvent::DeviceSkipped`] instead of being created — useful for
/// callers that only want regular file content (e.g. a distro probe reading
/// a single config file out of a layer).
pub fn extract_tar(
    archive_path: &Path,
    extract_dir: &Path,
    skip_symlinks: bool,
) -> Result<Vec<ExtractEvent>> {
    let mut archive = open_archive(archive_path)?;
    let mut events = Vec::new();
    let mut pending_hardlinks = VecDeque::new();
    let mut pending_symlinks = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| Error::TarRead { path: archive_path.to_path_buf(), source: e })?;

    for entry_result in entries {
        let mut entry =
            entry_result.map_err(|e| Error::TarRead { path: archive_path.to_path_buf(), source: e })?;
        let header = entry.header().clone();
        let entry_type = header.entry_type();
        let raw_path = entry
            .path()
            .map_err(|e| Error::TarRead { path: archive_path.to_path_buf(), source: e })?
            .into_owned();
        let raw_path_str = raw_path.to_string_lossy().into_owned();

        if raw_path.is_absolute() {
            record(&mut events, ExtractEvent::AbsolutePathRewritten { archive_path: raw_path_str.clone() });
        }

        let rel_path = match normalize_entry_path(&raw_path) {
            Some(p) => p,
            None => {
                record(&mut events, ExtractEvent::PathEscape { archive_path: raw_path_str });
                continue;
            }
        };

        if let Some(name) = rel_path.file_name().and_then(|n| n.to_str()) {
            if name == WHITEOUT_OPAQUE {
                let event = ExtractEvent::WhiteoutMarker { archive_path: raw_path_str, opaque: true };
                record(&mut events, event);
                continue;
            }
            if name.starts_with(WHITEOUT_PREFIX) {
                let event = ExtractEvent::WhiteoutMarker { archive_path: raw_path_str, opaque: false };
                record(&mut events, event);
                continue;
            }
        }

        let dest = extract_dir.join(&rel_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        match entry_type {
            tar::EntryType::Directory => {
                fs::create_dir_all(&dest).map_err(|e| Error::io(&dest, e))?;
            }
            tar::EntryType::Regular => {
                if let Ok(meta) = fs::symlink_metadata(&dest) {
                    if meta.is_dir() && !meta.is_symlink() {
                        let _ = fs::remove_dir_all(&dest);
                    } else {
                        let _ = fs::remove_file(&dest);
                    }
                }
                let mut out_file = File::create(&dest).map_err(|e| Error::io(&dest, e))?;
                std::io::copy(&mut entry, &mut out_file).map_err(|e| Error::io(&dest, e))?;
            }
            tar::EntryType::Symlink => {
                if skip_symlinks {
                    record(&mut events, ExtractEvent::DeviceSkipped { archive_path: raw_path_str });
                    continue;
                }
                let link_name = entry
                    .link_name()
                    .map_err(|e| Error::TarRead { path: archive_path.to_path_buf(), source: e })?;
                let Some(link_name) = link_name else {
                    record(&mut events, ExtractEvent::DeviceSkipped { archive_path: raw_path_str });
                    continue;
                };
                let target = if link_name.is_absolute() {
                    match normalize_entry_path(&link_name) {
                        Some(p) => extract_dir.join(p),
                        None => {
                            record(&mut events, ExtractEvent::PathEscape { archive_path: raw_path_str });
                            continue;
                        }
                    }
                } else {
                    dest.parent()
                        .map(|p| p.join(&link_name))
                        .unwrap_or_else(|| extract_dir.join(&link_name))
                };

                #[cfg(unix)]
                {
                    if fs::symlink_metadata(&dest).is_ok() {
                        let _ = fs::remove_file(&dest);
                    }
                    if std::os::unix::fs::symlink(&target, &dest).is_err() {
                        pending_symlinks.push(PendingSymlink {
                            dest,
                            target,
                            archive_path: raw_path_str,
                        });
                    }
                }
                #[cfg(not(unix))]
                {
                    record(&mut events, ExtractEvent::DeviceSkipped { archive_path: raw_path_str });
                }
            }
            tar::EntryType::Link => {
                let link_name = entry
                    .link_name()
                    .map_err(|e| Error::TarRead { path: archive_path.to_path_buf(), source: e })?;
                let Some(link_name) = link_name else {
                    record(&mut events, ExtractEvent::DeviceSkipped { archive_path: raw_path_str });
                    continue;
                };
                let target = match normalize_entry_path(&link_name) {
                    Some(p) => extract_dir.join(p),
                    None => {
                        record(&mut events, ExtractEvent::PathEscape { archive_path: raw_path_str });
                        continue;
                    }
                };
                pending_hardlinks.push_back(PendingHardlink {
                    dest,
                    target,
                    archive_path: raw_path_str,
                });
            }
            _ => {
                record(&mut events, ExtractEvent::DeviceSkipped { archive_path: raw_path_str });
            }
        }
    }

    // Hardlinks may reference targets that appear later in archive order;
    // requeue until a full pass makes no progress.
    let mut remaining = pending_hardlinks.len();
    while let Some(link) = pending_hardlinks.pop_front() {
        if link.target.exists() {
            if fs::symlink_metadata(&link.dest).is_ok() {
                let _ = fs::remove_file(&link.dest);
            }
            if fs::hard_link(&link.target, &link.dest).is_err() {
                fs::copy(&link.target, &link.dest).map_err(|e| Error::io(&link.dest, e))?;
            }
            remaining = pending_hardlinks.len();
        } else if remaining == 0 {
            let event = ExtractEvent::BrokenHardlink {
                archive_path: link.archive_path,
                target: link.target.display().to_string(),
            };
            record(&mut events, event);
        } else {
            remaining -= 1;
            pending_hardlinks.push_back(link);
        }
    }

    for link in pending_symlinks {
        if link.target.exists() {
            fs::copy(&link.target, &link.dest).map_err(|e| Error::io(&link.dest, e))?;
        } else {
            let event = ExtractEvent::BrokenSymlink {
                archive_path: link.archive_path,
                target: link.target.display().to_string(),
            };
            record(&mut events, event);
        }
    }

    Ok(events)
}
