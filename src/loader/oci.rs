//! OCI image-layout (`index.json` + `oci-layout` + `blobs/sha256/<hex>`) loader.

use super::LoadOptions;
use crate::archive::sha256_digest_of_file;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::json::load_json;
use crate::model::{ExtractedLocation, HistoryEntry, Image, ImageFormat, Layer};
use chrono::{DateTime, Utc};
use oci_spec::image::{ImageConfiguration, ImageIndex, ImageManifest};
use std::path::{Path, PathBuf};

const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

fn blob_path(dir: &Path, digest: &str) -> Result<PathBuf> {
    let parsed = Digest::parse(digest)
        .ok_or_else(|| Error::UnsupportedMediaType(format!("malformed digest {digest:?}")))?;
    Ok(dir
        .join("blobs")
        .join(parsed.algorithm().to_string())
        .join(parsed.bare()))
}

/// Loads every image referenced by `index.json` under `dir`.
pub fn load(dir: &Path, opts: LoadOptions) -> Result<Vec<Image>> {
    let index_path = dir.join("index.json");
    if !index_path.exists() {
        return Err(Error::MissingManifest(index_path));
    }
    let index_json = load_json(&index_path)?;
    let index: ImageIndex =
        serde_json::from_value(index_json).map_err(|e| Error::json(&index_path, e))?;

    if index.schema_version() as i64 != 2 {
        return Err(Error::UnsupportedSchemaVersion(index.schema_version() as i64));
    }

    let descriptors = index.manifests();
    if descriptors.is_empty() {
        return Err(Error::MalformedManifest(index_path));
    }

    descriptors
        .iter()
        .map(|descriptor| load_manifest(dir, &descriptor.digest().to_string(), opts))
        .collect()
}

fn load_manifest(dir: &Path, manifest_digest: &str, opts: LoadOptions) -> Result<Image> {
    let manifest_path = blob_path(dir, manifest_digest)?;
    let manifest_json = load_json(&manifest_path)?;
    let manifest: ImageManifest =
        serde_json::from_value(manifest_json).map_err(|e| Error::json(&manifest_path, e))?;

    let media_type = manifest
        .media_type()
        .clone()
        .map(|m| m.to_string())
        .unwrap_or_default();
    if media_type != MANIFEST_MEDIA_TYPE {
        return Err(Error::UnsupportedMediaType(media_type));
    }

    let config_digest = manifest.config().digest().to_string();
    let config_path = blob_path(dir, &config_digest)?;

    let image_id = Digest::parse(&config_digest)
        .map(|d| d.bare().to_string())
        .unwrap_or_default();

    if opts.verify {
        let expected = Digest::parse(&config_digest)
            .ok_or_else(|| Error::UnsupportedMediaType(config_digest.clone()))?;
        let actual = sha256_digest_of_file(&config_path)?;
        if actual != expected {
            return Err(Error::ConfigDigestMismatch {
                path: config_path.clone(),
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    let config_json = load_json(&config_path)?;
    let config: ImageConfiguration =
        serde_json::from_value(config_json).map_err(|e| Error::json(&config_path, e))?;

    let diff_ids: Vec<String> = config.rootfs().diff_ids().clone();
    if config.rootfs().typ() != "layers" {
        return Err(Error::UnsupportedRootfsType(config.rootfs().typ().to_string()));
    }

    let history: Vec<HistoryEntry> = config
        .history()
        .iter()
        .flatten()
        .map(|h| HistoryEntry {
            created: h
                .created()
                .as_ref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            created_by: h.created_by().clone(),
            author: h.author().clone(),
            comment: h.comment().clone(),
            empty_layer: h.empty_layer().unwrap_or(false),
        })
        .collect();

    // Step 2: construct one Layer per (manifest layer, diff_id) pair,
    // independent of history. Step 3 aligns history fields onto these layers
    // by position among the non-empty history entries; a length mismatch
    // there leaves the per-layer history fields empty rather than dropping
    // layers.
    let non_empty_history: Vec<&HistoryEntry> = history.iter().filter(|h| !h.empty_layer).collect();
    let manifest_layers = manifest.layers();

    let mut layers = Vec::new();
    for (i, (layer_descriptor, diff_id_str)) in manifest_layers.iter().zip(diff_ids.iter()).enumerate() {
        let layer_digest_str = layer_descriptor.digest().to_string();
        let archive_location = blob_path(dir, &layer_digest_str)?;
        let diff_id = Digest::parse(diff_id_str);
        let is_gzip = layer_descriptor.media_type().to_string().ends_with("+gzip");

        let sha256 = if is_gzip {
            // diff_id is the uncompressed content digest; decompress before
            // hashing rather than hashing the compressed blob directly.
            let file = std::fs::File::open(&archive_location)
                .map_err(|e| Error::io(&archive_location, e))?;
            let decoder = flate2::read::GzDecoder::new(file);
            crate::digest::sha256_digest_reader(decoder)
                .map_err(|e| Error::io(&archive_location, e))?
        } else {
            sha256_digest_of_file(&archive_location)?
        };

        if let Some(expected) = &diff_id {
            if opts.verify && &sha256 != expected {
                return Err(Error::LayerDigestMismatch {
                    path: archive_location.clone(),
                    expected: expected.to_string(),
                    actual: sha256.to_string(),
                });
            }
            if &sha256 != expected {
                log::warn!(
                    "layer diff_id mismatch at {}: config says {}, computed {}",
                    archive_location.display(),
                    expected,
                    sha256
                );
            }
        }

        let size_bytes = std::fs::metadata(&archive_location).map(|m| m.len()).unwrap_or(0);
        let hist = non_empty_history.get(i);

        layers.push(Layer {
            layer_id: diff_id.as_ref().map(|d| d.bare().to_string()).unwrap_or_else(|| sha256.bare().to_string()),
            archive_location,
            sha256: diff_id.unwrap_or(sha256),
            size_bytes,
            parent_id: None,
            extracted_location: ExtractedLocation::NotExtracted,
            is_empty_layer: false,
            author: hist.and_then(|h| h.author.clone()),
            created: hist.and_then(|h| h.created),
            created_by: hist.and_then(|h| h.created_by.clone()),
            comment: hist.and_then(|h| h.comment.clone()),
        });
    }

    let labels = config
        .config()
        .as_ref()
        .and_then(|c| c.labels().clone())
        .map(|m| m.into_iter().collect())
        .unwrap_or_default();

    Ok(Image {
        image_id,
        config_digest: Digest::parse(&config_digest).unwrap_or_else(|| Digest::sha256("")),
        image_format: ImageFormat::Oci,
        extracted_location: ExtractedLocation::Extracted { path: dir.to_path_buf() },
        archive_location: None,
        tags: Vec::new(),
        layers,
        history,
        docker_version: None,
        os: config.os().to_string().into(),
        os_version: config.os_version().clone(),
        architecture: config.architecture().to_string().into(),
        variant: config.variant().clone(),
        created: config
            .created()
            .as_ref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        author: config.author().clone(),
        comment: None,
        labels,
        distro: None,
    })
}
