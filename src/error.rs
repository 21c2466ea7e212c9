//! Typed error taxonomy for the image-inspection core.
//!
//! The library never panics on malformed input; every fallible operation
//! returns a [`Result<T, Error>`]. The thin CLI binary wraps these in
//! `anyhow` at its own boundary instead of matching on variants.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read tar archive {path}: {source}")]
    TarRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest.json not found under {0}")]
    MissingManifest(PathBuf),

    #[error("manifest.json at {0} is not a non-empty JSON array")]
    MalformedManifest(PathBuf),

    #[error("config file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("could not classify {0} as a docker or OCI image layout: {1}")]
    UnknownLayout(PathBuf, String),

    #[error("unsupported rootfs.type {0:?}, expected \"layers\"")]
    UnsupportedRootfsType(String),

    #[error("unsupported OCI schemaVersion {0}, expected 2")]
    UnsupportedSchemaVersion(i64),

    #[error("unsupported OCI manifest media type {0:?}")]
    UnsupportedMediaType(String),

    #[error("config digest mismatch at {path}: expected {expected}, computed {actual}")]
    ConfigDigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("layer digest mismatch at {path}: expected {expected}, computed {actual}")]
    LayerDigestMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("detected distro os {detected} does not match base distro os {base}")]
    DistroOsMismatch { base: String, detected: String },

    #[error("cannot align layer {layer_index} (created_by {created_by:?}) to dockerfile instruction {instruction:?}")]
    CannotAlign {
        layer_index: usize,
        created_by: String,
        instruction: String,
    },

    #[error("layer {layer_index} aligned to {instruction} but values differ: layer={layer_value:?} dockerfile={dockerfile_value:?}")]
    AlignedCommandMismatch {
        layer_index: usize,
        instruction: String,
        layer_value: String,
        dockerfile_value: String,
    },

    #[error("non-sortable legacy layer list: {cycles} cycles exceeded limit {max_cycles}, {remaining} layers left unsorted")]
    NonSortableLayers {
        cycles: usize,
        max_cycles: usize,
        remaining: usize,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}
