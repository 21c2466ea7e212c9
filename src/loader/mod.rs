//! Image loaders for each supported on-disk layout.

use crate::error::{Error, Result};
use crate::layout::{detect_layout, Layout};
use crate::model::Image;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tempfile::TempDir;

pub mod docker;
pub mod oci;

/// Whether to verify that each layer's (and the config's) computed digest
/// matches the digest recorded in the manifest. When `false`, a mismatch is
/// logged as a warning and loading continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    pub verify: bool,
}

/// Loads every image out of a top-level `docker save` tarball or OCI image
/// archive at `archive_path`: extracts it into a fresh temporary directory,
/// classifies the resulting layout, and dispatches to [`docker::load`] or
/// [`oci::load`].
///
/// The temporary directory is cleaned up once this function returns, so
/// every [`Image`] it produces has `archive_location: None` and an
/// `extracted_location` pointing at a directory that no longer exists —
/// callers that need the extracted content to persist should extract the
/// archive themselves and call [`docker::load`]/[`oci::load`] directly.
pub fn get_images_from_tarball(archive_path: &Path, opts: LoadOptions) -> Result<Vec<Image>> {
    let temp_dir = TempDir::new().map_err(|e| Error::io(archive_path, e))?;
    extract_archive(archive_path, temp_dir.path())?;

    match detect_layout(temp_dir.path()) {
        Layout::Docker => docker::load(temp_dir.path(), opts),
        Layout::Oci => oci::load(temp_dir.path(), opts),
        Layout::LegacyV10 => Err(Error::UnknownLayout(
            archive_path.to_path_buf(),
            "legacy v1.0 image repository layout is not loadable".to_string(),
        )),
        Layout::Unknown(reason) => Err(Error::UnknownLayout(archive_path.to_path_buf(), reason)),
    }
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

fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| Error::io(archive_path, e))?;
    let map_err = |e: std::io::Error| Error::io(archive_path, e);

    if is_gzip(archive_path)? {
        tar::Archive::new(GzDecoder::new(file)).unpack(dest).map_err(map_err)
    } else {
        tar::Archive::new(file).unpack(dest).map_err(map_err)
    }
}
