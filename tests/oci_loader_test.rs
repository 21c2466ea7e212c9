mod common;

use common::write_layer_tar;
use container_inspector::loader::{oci, LoadOptions};
use sha2::{Digest as _, Sha256};
use std::fs;
use std::path::Path;

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn write_blob(dir: &Path, bytes: &[u8]) -> String {
    let hex = hex_sha256(bytes);
    let blob_dir = dir.join("blobs/sha256");
    fs::create_dir_all(&blob_dir).unwrap();
    fs::write(blob_dir.join(&hex), bytes).unwrap();
    format!("sha256:{hex}")
}

fn write_image(dir: &Path, tag: &str) -> String {
    let layer_path = dir.join(format!("{tag}.tar"));
    common::write_layer_tar(&layer_path, &[common::Entry::File("hello", tag.as_bytes())]);
    let layer_bytes = fs::read(&layer_path).unwrap();
    let layer_digest = write_blob(dir, &layer_bytes);
    let diff_id = layer_digest.clone();

    let config = serde_json::json!({
        "architecture": "amd64",
        "os": "linux",
        "config": {},
        "rootfs": {"type": "layers", "diff_ids": [diff_id]},
        "history": []
    });
    let config_bytes = serde_json::to_vec(&config).unwrap();
    let config_digest = write_blob(dir, &config_bytes);

    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": config_digest,
            "size": config_bytes.len()
        },
        "layers": [{
            "mediaType": "application/vnd.oci.image.layer.v1.tar",
            "digest": layer_digest,
            "size": layer_bytes.len()
        }]
    });
    let manifest_bytes = serde_json::to_vec(&manifest).unwrap();
    write_blob(dir, &manifest_bytes)
}

#[test]
fn multi_manifest_index_returns_every_image() {
    let dir = tempfile::tempdir().unwrap();

    let manifest_a = write_image(dir.path(), "a");
    let manifest_b = write_image(dir.path(), "b");

    let index = serde_json::json!({
        "schemaVersion": 2,
        "manifests": [
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_a,
                "size": 1
            },
            {
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_b,
                "size": 1
            }
        ]
    });
    fs::write(dir.path().join("index.json"), serde_json::to_vec(&index).unwrap()).unwrap();
    fs::write(dir.path().join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#).unwrap();

    let images = oci::load(dir.path(), LoadOptions { verify: true }).unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].layers.len(), 1);
    assert_eq!(images[1].layers.len(), 1);
    assert_ne!(images[0].image_id, images[1].image_id);
    assert_eq!(images[0].image_id.len(), 64);
}
