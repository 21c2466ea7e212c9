use std::path::Path;

pub enum Entry<'a> {
    File(&'a str, &'a [u8]),
    Whiteout(&'a str),
    OpaqueWhiteout(&'a str),
}

/// Builds a plain (uncompressed) tar archive at `path` from a list of
/// entries. Whiteout entries are written as empty regular files named
/// `.wh.<name>` / `.wh..wh..opq`, exactly as `docker save` layer tarballs
/// represent them.
pub fn write_layer_tar(path: &Path, entries: &[Entry]) {
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(file);
    for entry in entries {
        let (name, content): (String, &[u8]) = match entry {
            Entry::File(name, content) => (name.to_string(), content),
            Entry::Whiteout(name) => {
                let dir = Path::new(name).parent().map(|p| p.to_string_lossy().to_string());
                let base = Path::new(name).file_name().unwrap().to_string_lossy();
                let marker = match dir {
                    Some(d) if !d.is_empty() => format!("{d}/.wh.{base}"),
                    _ => format!(".wh.{base}"),
                };
                (marker, &[][..])
            }
            Entry::OpaqueWhiteout(dir) => (format!("{dir}/.wh..wh..opq"), &[][..]),
        };
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, &name, content).unwrap();
    }
    builder.finish().unwrap();
}

pub fn blank_layer(layer_id: &str, archive_location: std::path::PathBuf) -> container_inspector::Layer {
    container_inspector::Layer {
        layer_id: layer_id.to_string(),
        archive_location,
        sha256: container_inspector::Digest::sha256("0".repeat(64)),
        size_bytes: 0,
        parent_id: None,
        extracted_location: container_inspector::model::ExtractedLocation::NotExtracted,
        is_empty_layer: false,
        author: None,
        created: None,
        created_by: None,
        comment: None,
    }
}

pub fn blank_image(layers: Vec<container_inspector::Layer>) -> container_inspector::Image {
    container_inspector::Image {
        image_id: "test-image".to_string(),
        config_digest: container_inspector::Digest::sha256("0".repeat(64)),
        image_format: container_inspector::model::ImageFormat::Docker,
        extracted_location: container_inspector::model::ExtractedLocation::NotExtracted,
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
