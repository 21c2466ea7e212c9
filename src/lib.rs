//! Parses container image tarballs and directories (`docker save` v1.1/v1.2
//! and OCI image layout v2), and reconstructs a squashed root filesystem by
//! replaying layer diffs with whiteout semantics.
//!
//! # Usage
//!
//! ```no_run
//! use container_inspector::loader::{get_images_from_tarball, LoadOptions};
//! use container_inspector::squash::rebuild_rootfs;
//! use std::path::Path;
//!
//! let images = get_images_from_tarball(Path::new("/tmp/image.tar"), LoadOptions { verify: true })?;
//! rebuild_rootfs(&images[0], Path::new("/tmp/rootfs"))?;
//! # Ok::<(), container_inspector::error::Error>(())
//! ```
//!
//! This crate does not fetch images from a registry, talk to a running
//! container engine, or preserve POSIX ownership/permissions/xattrs on
//! extraction — it operates purely on an already-present tarball or
//! extracted directory.

pub mod archive;
pub mod digest;
pub mod distro;
pub mod dockerfile;
pub mod error;
pub mod json;
pub mod layout;
pub mod loader;
pub mod model;
pub mod packages;
pub mod sort;
pub mod squash;
pub mod walker;

pub use digest::Digest;
pub use error::{Error, Result};
pub use model::{Distro, Image, Layer, Resource};
