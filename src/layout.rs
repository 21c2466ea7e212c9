//! Classifies an extracted directory as a Docker or OCI image layout.

use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// `manifest.json` at the top level (docker save v1.1/v1.2).
    Docker,
    /// `index.json` + `oci-layout` at the top level.
    Oci,
    /// A `repositories` file alongside `<hex-id>/{VERSION,json,layer.tar}`
    /// directories, recognized for diagnostics only — this crate does not
    /// load this format.
    LegacyV10,
    Unknown(String),
}

pub fn detect_layout(dir: &Path) -> Layout {
    if dir.join("manifest.json").exists() {
        return Layout::Docker;
    }
    if dir.join("index.json").exists() && dir.join("oci-layout").exists() && dir.join("blobs").exists() {
        return Layout::Oci;
    }
    if looks_like_legacy_v10(dir) {
        return Layout::LegacyV10;
    }
    Layout::Unknown(format!(
        "{} has neither manifest.json nor index.json+oci-layout",
        dir.display()
    ))
}

fn looks_like_legacy_v10(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    let mut has_repositories = false;
    let mut has_layer_dir = false;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == "repositories" && path.is_file() {
            has_repositories = true;
        } else if path.is_dir()
            && name.len() == 64
            && name.chars().all(|c| c.is_ascii_hexdigit())
            && path.join("VERSION").exists()
            && path.join("json").exists()
            && path.join("layer.tar").exists()
        {
            has_layer_dir = true;
        }
    }
    has_repositories || has_layer_dir
}
