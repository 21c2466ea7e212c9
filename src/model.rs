//! Core data model: resources, layers, images, and distro facts.
//!
//! These are plain structs, not the mixin hierarchy the original tool used
//! internally (`ConfigMixin`/`ToDictMixin`) — every field an `Image` or
//! `Layer` needs lives directly on the struct.

use crate::digest::Digest;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Docker,
    Oci,
}

/// A single file, directory, or symlink produced by extracting one layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Resource {
    /// Path relative to the layer root.
    pub path: PathBuf,
    /// Absolute location on disk once the layer has been extracted.
    pub location: PathBuf,
    pub is_file: bool,
    pub is_symlink: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryEntry {
    pub created: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub author: Option<String>,
    pub comment: Option<String>,
    pub empty_layer: bool,
}

/// Where a layer's content currently lives, if anywhere. Modeled as a sum
/// type instead of an `Option<PathBuf>` paired with a separate boolean flag,
/// so "never extracted", "extracted here", and "cleaned up" cannot be
/// confused with each other.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExtractedLocation {
    NotExtracted,
    Extracted { path: PathBuf },
}

impl ExtractedLocation {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ExtractedLocation::Extracted { path } => Some(path),
            ExtractedLocation::NotExtracted => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Layer {
    pub layer_id: String,
    /// Location of this layer's tar archive. Always present for non-empty
    /// layers; empty (history-only) layers never reach the layer list.
    pub archive_location: PathBuf,
    pub sha256: Digest,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub extracted_location: ExtractedLocation,
    pub is_empty_layer: bool,
    pub author: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub comment: Option<String>,
}

impl Layer {
    pub fn is_extracted(&self) -> bool {
        matches!(self.extracted_location, ExtractedLocation::Extracted { .. })
    }

    /// Lists every file and symlink under this layer's extracted location.
    /// Returns an empty list if the layer hasn't been extracted.
    pub fn resources(&self) -> Vec<Resource> {
        let Some(root) = self.extracted_location.path() else {
            return Vec::new();
        };
        walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != root)
            .filter(|e| e.file_type().is_file() || e.file_type().is_symlink())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(root).ok()?.to_path_buf();
                Some(Resource {
                    path: rel,
                    location: e.path().to_path_buf(),
                    is_file: e.file_type().is_file(),
                    is_symlink: e.file_type().is_symlink(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Distro {
    pub os: Option<String>,
    pub architecture: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub identifier: Option<String>,
    pub id_like: Option<String>,
    pub version_codename: Option<String>,
    pub version_id: Option<String>,
    pub pretty_name: Option<String>,
    pub cpe_name: Option<String>,
    pub home_url: Option<String>,
    pub documentation_url: Option<String>,
    pub support_url: Option<String>,
    pub bug_report_url: Option<String>,
    pub privacy_policy_url: Option<String>,
    pub build_id: Option<String>,
    pub variant: Option<String>,
    pub variant_id: Option<String>,
    pub logo: Option<String>,
    /// Any `os-release` key this struct doesn't have a named field for.
    pub extra: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistroFamily {
    Debian,
    Rpm,
    Arch,
    Alpine,
    Bsd,
    Other,
}

impl Distro {
    pub fn is_debian_based(&self) -> bool {
        let id_matches = matches!(self.identifier.as_deref(), Some("debian") | Some("ubuntu"));
        let id_like_matches = self
            .id_like
            .as_deref()
            .is_some_and(|s| s.split_whitespace().any(|tok| tok == "debian"));
        id_matches || id_like_matches
    }

    pub fn family(&self) -> DistroFamily {
        let id = self.identifier.as_deref().unwrap_or("");
        let id_like = self.id_like.as_deref().unwrap_or("");
        if self.is_debian_based() {
            DistroFamily::Debian
        } else if id == "alpine" {
            DistroFamily::Alpine
        } else if id == "arch" || id_like.contains("arch") {
            DistroFamily::Arch
        } else if ["fedora", "rhel", "centos", "rocky", "almalinux", "suse", "opensuse"]
            .contains(&id)
            || id_like.split_whitespace().any(|t| t == "fedora" || t == "rhel" || t == "suse")
        {
            DistroFamily::Rpm
        } else if matches!(self.os.as_deref(), Some("freebsd") | Some("bsd")) {
            DistroFamily::Bsd
        } else {
            DistroFamily::Other
        }
    }

    /// Merges another (more specific) `Distro` into this one: every
    /// non-empty field on `other` overrides the corresponding field here.
    pub fn merge(mut self, other: Distro) -> Distro {
        macro_rules! take {
            ($field:ident) => {
                if other.$field.is_some() {
                    self.$field = other.$field;
                }
            };
        }
        take!(os);
        take!(architecture);
        take!(name);
        take!(version);
        take!(identifier);
        take!(id_like);
        take!(version_codename);
        take!(version_id);
        take!(pretty_name);
        take!(cpe_name);
        take!(home_url);
        take!(documentation_url);
        take!(support_url);
        take!(bug_report_url);
        take!(privacy_policy_url);
        take!(build_id);
        take!(variant);
        take!(variant_id);
        take!(logo);
        self.extra.extend(other.extra);
        self
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Image {
    pub image_id: String,
    pub config_digest: Digest,
    pub image_format: ImageFormat,
    pub extracted_location: ExtractedLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_location: Option<PathBuf>,
    pub tags: Vec<String>,
    /// Non-empty layers, bottom to top.
    pub layers: Vec<Layer>,
    /// Every history entry, including empty ones, in chronological order.
    pub history: Vec<HistoryEntry>,
    pub docker_version: Option<String>,
    pub os: Option<String>,
    pub os_version: Option<String>,
    pub architecture: Option<String>,
    pub variant: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub comment: Option<String>,
    pub labels: std::collections::BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distro: Option<Distro>,
}

impl Image {
    pub fn bottom_layer(&self) -> Option<&Layer> {
        self.layers.first()
    }

    pub fn top_layer(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// Deletes the extracted rootfs/layer directories tracked by this image
    /// and clears every `extracted_location`, including each layer's.
    pub fn cleanup(&mut self) -> std::io::Result<()> {
        if let Some(path) = self.extracted_location.path().cloned() {
            if path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }
        self.extracted_location = ExtractedLocation::NotExtracted;
        for layer in &mut self.layers {
            layer.extracted_location = ExtractedLocation::NotExtracted;
        }
        Ok(())
    }
}
