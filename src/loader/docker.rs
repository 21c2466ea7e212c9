//! Docker `docker save` v1.1/v1.2 manifest + config loader.

use super::LoadOptions;
use crate::archive::sha256_digest_of_file;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::json::{load_json, normalize_keys};
use crate::model::{ExtractedLocation, HistoryEntry, Image, ImageFormat, Layer};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;

/// Loads every image described by `manifest.json` under `dir`.
///
/// Docker's own manifest.json key casing has drifted across producers (some
/// tools emit `Config`/`RepoTags`/`Layers`, others lower-case them), so the
/// manifest entry is read through [`normalize_keys`] before field lookup.
/// The config file itself keeps its original (lower snake_case) casing,
/// which has always been stable.
pub fn load(dir: &Path, opts: LoadOptions) -> Result<Vec<Image>> {
    let manifest_path = dir.join("manifest.json");
    if !manifest_path.exists() {
        return Err(Error::MissingManifest(manifest_path));
    }
    let manifest_raw = load_json(&manifest_path)?;
    let manifest = normalize_keys(manifest_raw);
    let entries = manifest
        .as_array()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| Error::MalformedManifest(manifest_path.clone()))?;

    entries
        .iter()
        .map(|entry| load_entry(dir, &manifest_path, entry, opts))
        .collect()
}

fn load_entry(dir: &Path, manifest_path: &Path, entry: &Value, opts: LoadOptions) -> Result<Image> {
    let config_rel = entry["config"]
        .as_str()
        .ok_or_else(|| Error::MissingConfig(manifest_path.to_path_buf()))?;
    let config_path = dir.join(config_rel);
    if !config_path.exists() {
        return Err(Error::MissingConfig(config_path));
    }
    let config = load_json(&config_path)?;

    let config_hex = config_rel
        .rsplit('/')
        .next()
        .and_then(|name| name.strip_suffix(".json"))
        .unwrap_or_default();
    let config_digest = Digest::sha256(config_hex);

    if opts.verify {
        let actual = sha256_digest_of_file(&config_path)?;
        if actual != config_digest {
            return Err(Error::ConfigDigestMismatch {
                path: config_path.clone(),
                expected: config_digest.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    let image_id = config_hex.to_string();

    let layer_paths: Vec<String> = entry["layers"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let tags: Vec<String> = entry["repotags"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let history_raw = config["history"].as_array().cloned().unwrap_or_default();
    let diff_ids: Vec<String> = config["rootfs"]["diff_ids"]
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let history: Vec<HistoryEntry> = history_raw.iter().map(parse_history_entry).collect();

    // Step 2: construct one Layer per (layer_path, diff_id) pair, independent
    // of history. Step 3 (below) aligns history fields onto these layers by
    // position among the non-empty history entries; a length mismatch there
    // leaves the per-layer history fields empty rather than dropping layers.
    let non_empty_history: Vec<&HistoryEntry> = history.iter().filter(|h| !h.empty_layer).collect();

    let mut layers = Vec::new();
    for (i, (archive_rel, diff_id_str)) in layer_paths.iter().zip(diff_ids.iter()).enumerate() {
        let archive_location = dir.join(archive_rel);
        let recorded_digest = Digest::parse(diff_id_str);

        let actual_digest = if opts.verify || recorded_digest.is_none() {
            Some(sha256_digest_of_file(&archive_location)?)
        } else {
            None
        };

        let sha256 = match (recorded_digest.clone(), actual_digest.clone()) {
            (Some(expected), Some(actual)) => {
                if opts.verify && expected != actual {
                    return Err(Error::LayerDigestMismatch {
                        path: archive_location.clone(),
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
                if expected != actual {
                    log::warn!(
                        "layer digest mismatch at {}: manifest says {}, computed {}",
                        archive_location.display(),
                        expected,
                        actual
                    );
                }
                expected
            }
            (Some(expected), None) => expected,
            (None, Some(actual)) => actual,
            (None, None) => unreachable!("actual_digest computed whenever recorded_digest is None"),
        };

        let layer_id = recorded_digest.map(|d| d.bare().to_string()).unwrap_or_else(|| sha256.bare().to_string());
        let size_bytes = std::fs::metadata(&archive_location).map(|m| m.len()).unwrap_or(0);
        let hist = non_empty_history.get(i);

        layers.push(Layer {
            layer_id,
            archive_location,
            sha256,
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

    let labels = merge_labels(&config["config"], &config["container_config"]);

    Ok(Image {
        image_id,
        config_digest,
        image_format: ImageFormat::Docker,
        extracted_location: ExtractedLocation::Extracted { path: dir.to_path_buf() },
        archive_location: None,
        tags,
        layers,
        history,
        docker_version: config["docker_version"].as_str().map(str::to_string),
        os: config["os"].as_str().map(str::to_string),
        os_version: config["os.version"].as_str().map(str::to_string),
        architecture: config["architecture"].as_str().map(str::to_string),
        variant: config["variant"].as_str().map(str::to_string),
        created: parse_timestamp(config["created"].as_str()),
        author: config["author"].as_str().map(str::to_string),
        comment: config["comment"].as_str().map(str::to_string),
        labels,
        distro: None,
    })
}

fn parse_timestamp(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_history_entry(v: &Value) -> HistoryEntry {
    HistoryEntry {
        created: parse_timestamp(v["created"].as_str()),
        created_by: v["created_by"].as_str().map(str::to_string),
        author: v["author"].as_str().map(str::to_string),
        comment: v["comment"].as_str().map(str::to_string),
        empty_layer: v["empty_layer"].as_bool().unwrap_or(false),
    }
}

fn merge_labels(config: &Value, container_config: &Value) -> std::collections::BTreeMap<String, String> {
    let mut labels = std::collections::BTreeMap::new();
    for source in [container_config, config] {
        let map = source["Labels"].as_object().or_else(|| source["labels"].as_object());
        if let Some(map) = map {
            for (k, v) in map {
                if let Some(s) = v.as_str() {
                    labels.entry(k.to_lowercase()).or_insert_with(|| s.to_string());
                }
            }
        }
    }
    labels
}
