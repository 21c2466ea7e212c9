//! Installed-package enumeration via a caller-supplied collaborator.
//!
//! This crate has no package database of its own; `installed_packages`
//! just runs `packages_getter` once per extracted layer (bottom to top) and
//! keeps only the first occurrence of each package URL.

use crate::model::Image;
use std::collections::HashSet;
use std::path::Path;

/// Runs `packages_getter` over every extracted layer of `image`, in
/// bottom-to-top order, yielding `(purl, package)` pairs with the first
/// occurrence of each purl.
pub fn installed_packages<'a, F, I>(
    image: &'a Image,
    mut packages_getter: F,
) -> Vec<(String, serde_json::Value)>
where
    F: FnMut(&Path) -> I,
    I: Iterator<Item = (String, serde_json::Value)>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for layer in &image.layers {
        let Some(root) = layer.extracted_location.path() else {
            continue;
        };
        for (purl, package) in packages_getter(root) {
            if seen.insert(purl.clone()) {
                out.push((purl, package));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;
    use crate::model::{ExtractedLocation, ImageFormat, Layer};
    use serde_json::json;

    fn image_with_layers(paths: Vec<&str>) -> Image {
        let layers = paths
            .into_iter()
            .enumerate()
            .map(|(i, p)| Layer {
                layer_id: format!("layer{i}"),
                archive_location: p.into(),
                sha256: Digest::sha256("x"),
                size_bytes: 0,
                parent_id: None,
                extracted_location: ExtractedLocation::Extracted { path: p.into() },
                is_empty_layer: false,
                author: None,
                created: None,
                created_by: None,
                comment: None,
            })
            .collect();
        Image {
            image_id: "test".into(),
            config_digest: Digest::sha256("x"),
            image_format: ImageFormat::Docker,
            extracted_location: ExtractedLocation::NotExtracted,
            archive_location: None,
            tags: vec![],
            layers,
            history: vec![],
            docker_version: None,
            os: None,
            os_version: None,
            architecture: None,
            variant: None,
            created: None,
            author: None,
            comment: None,
            labels: Default::default(),
            distro: None,
        }
    }

    #[test]
    fn dedups_by_first_seen_purl() {
        let image = image_with_layers(vec!["bottom", "top"]);
        let result = installed_packages(&image, |root| {
            let root = root.to_string_lossy().to_string();
            if root == "bottom" {
                vec![("pkg:deb/foo@1.0".to_string(), json!({"version": "1.0"}))].into_iter()
            } else {
                vec![
                    ("pkg:deb/foo@1.0".to_string(), json!({"version": "1.0-seen-again"})),
                    ("pkg:deb/bar@2.0".to_string(), json!({"version": "2.0"})),
                ]
                .into_iter()
            }
        });

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, "pkg:deb/foo@1.0");
        assert_eq!(result[0].1["version"], "1.0");
        assert_eq!(result[1].0, "pkg:deb/bar@2.0");
    }
}
