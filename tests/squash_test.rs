mod common;

use common::{blank_image, blank_layer, write_layer_tar, Entry};
use container_inspector::squash::rebuild_rootfs;

#[test]
fn single_layer_hello_world() {
    let dir = tempfile::tempdir().unwrap();
    let layer_tar = dir.path().join("layer0.tar");
    write_layer_tar(&layer_tar, &[Entry::File("hello", b"world")]);

    let image = blank_image(vec![blank_layer("layer0", layer_tar)]);
    let target = dir.path().join("rootfs");
    let deletions = rebuild_rootfs(&image, &target).unwrap();

    assert!(deletions.is_empty());
    assert_eq!(std::fs::read_to_string(target.join("hello")).unwrap(), "world");
}

#[test]
fn explicit_whiteout_deletes_lower_layer_path() {
    let dir = tempfile::tempdir().unwrap();

    let bottom_tar = dir.path().join("bottom.tar");
    write_layer_tar(
        &bottom_tar,
        &[
            Entry::File("hello", b"world"),
            Entry::File("additions/foo", b"foo"),
            Entry::File("additions/bar", b"bar"),
        ],
    );

    let top_tar = dir.path().join("top.tar");
    write_layer_tar(
        &top_tar,
        &[
            Entry::Whiteout("additions/bar"),
            Entry::File("additions/baz", b"baz"),
        ],
    );

    let image = blank_image(vec![
        blank_layer("bottom", bottom_tar),
        blank_layer("top", top_tar),
    ]);
    let target = dir.path().join("rootfs");
    let deletions = rebuild_rootfs(&image, &target).unwrap();

    assert_eq!(deletions, vec![std::path::PathBuf::from("additions/bar")]);
    assert!(target.join("hello").exists());
    assert!(target.join("additions/foo").exists());
    assert!(!target.join("additions/bar").exists());
    assert!(target.join("additions/baz").exists());
}

#[test]
fn opaque_whiteout_clears_directory_contents() {
    let dir = tempfile::tempdir().unwrap();

    let bottom_tar = dir.path().join("bottom.tar");
    write_layer_tar(
        &bottom_tar,
        &[
            Entry::File("cache/a", b"a"),
            Entry::File("cache/b", b"b"),
        ],
    );

    let top_tar = dir.path().join("top.tar");
    write_layer_tar(
        &top_tar,
        &[
            Entry::OpaqueWhiteout("cache"),
            Entry::File("cache/fresh", b"fresh"),
        ],
    );

    let image = blank_image(vec![
        blank_layer("bottom", bottom_tar),
        blank_layer("top", top_tar),
    ]);
    let target = dir.path().join("rootfs");
    rebuild_rootfs(&image, &target).unwrap();

    assert!(!target.join("cache/a").exists());
    assert!(!target.join("cache/b").exists());
    assert!(target.join("cache/fresh").exists());
}

#[test]
fn whiteout_for_missing_path_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let only_tar = dir.path().join("only.tar");
    write_layer_tar(&only_tar, &[Entry::Whiteout("never/existed")]);

    let image = blank_image(vec![blank_layer("only", only_tar)]);
    let target = dir.path().join("rootfs");
    let result = rebuild_rootfs(&image, &target);
    assert!(result.is_ok());
}
