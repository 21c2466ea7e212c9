//! Distro detection: `/etc/os-release` parsing and a depth-bounded probe for
//! Windows-style root filesystems.

use crate::error::{Error, Result};
use crate::model::Distro;
use crate::walker::DirWalker;
use std::path::Path;

const LINUX_PATHS: &[&str] = &["etc", "bin", "usr", "var", "lib", "sbin"];
const WINDOWS_PATHS: &[&str] = &["windows", "program files", "programdata", "users"];

/// Detects a [`Distro`] from an already-extracted rootfs, optionally merging
/// over a `base_distro` (e.g. one already known for a parent/earlier layer).
/// A mismatch between `base_distro.os` and the newly detected `os` is fatal,
/// since it usually indicates the rootfs is not what the caller expected.
pub fn from_rootfs(
    location: &Path,
    base_distro: Option<&Distro>,
    walker: &dyn DirWalker,
) -> Result<Option<Distro>> {
    let detected = find_linux_details(location, walker)?
        .or_else(|| find_windows_details(location, walker))
        .or_else(|| find_freebsd_details(location));

    let Some(detected) = detected else {
        return Ok(base_distro.cloned());
    };

    if let Some(base) = base_distro {
        if let (Some(base_os), Some(detected_os)) = (&base.os, &detected.os) {
            if base_os != detected_os {
                return Err(Error::DistroOsMismatch {
                    base: base_os.clone(),
                    detected: detected_os.clone(),
                });
            }
        }
        return Ok(Some(base.clone().merge(detected)));
    }

    Ok(Some(detected))
}

fn find_linux_details(location: &Path, walker: &dyn DirWalker) -> Result<Option<Distro>> {
    for candidate in ["etc/os-release", "usr/lib/os-release"] {
        let path = location.join(candidate);
        if path.is_file() {
            return Ok(Some(from_os_release_file(&path)?));
        }
    }

    // No os-release file, but the directory layout alone may still be
    // recognizably Linux (e.g. a layer that only touches /etc or /var).
    if find_root(location, 1, LINUX_PATHS, 3, walker).is_some() {
        return Ok(Some(Distro {
            os: Some("linux".to_string()),
            identifier: Some("linux".to_string()),
            name: Some("linux".to_string()),
            ..Default::default()
        }));
    }

    Ok(None)
}

fn find_windows_details(location: &Path, walker: &dyn DirWalker) -> Option<Distro> {
    find_root(location, 3, WINDOWS_PATHS, 2, walker).map(|_| Distro {
        os: Some("windows".to_string()),
        identifier: Some("windows".to_string()),
        name: Some("windows".to_string()),
        ..Default::default()
    })
}

fn find_freebsd_details(_location: &Path) -> Option<Distro> {
    None
}

/// Walks up to `max_depth` directories below `location` looking for a
/// directory whose lower-cased child names contain at least `min_matches`
/// of `root_paths`. Returns the matching directory's path. `max_depth == 0`
/// means unbounded, matching the `os.walk`-based original's zero-as-no-limit
/// convention.
pub fn find_root(
    location: &Path,
    max_depth: usize,
    root_paths: &[&str],
    min_matches: usize,
    walker: &dyn DirWalker,
) -> Option<std::path::PathBuf> {
    use std::collections::HashMap;

    let mut children_by_dir: HashMap<std::path::PathBuf, Vec<String>> = HashMap::new();
    for entry in walker.walk(location) {
        if max_depth != 0 && entry.depth > max_depth {
            continue;
        }
        if let (Some(parent), Some(name)) = (entry.path.parent(), entry.path.file_name()) {
            children_by_dir
                .entry(parent.to_path_buf())
                .or_default()
                .push(name.to_string_lossy().to_lowercase());
        }
    }

    for (dir, children) in &children_by_dir {
        let matches = root_paths
            .iter()
            .filter(|p| children.iter().any(|c| c == *p))
            .count();
        if matches >= min_matches {
            return Some(dir.clone());
        }
    }
    None
}

/// Parses a freedesktop `os-release` file into a [`Distro`], defaulting
/// `os`/`name`/`identifier` to `"linux"` and stashing any key this struct
/// has no named field for into `extra`.
pub fn from_os_release_file(path: &Path) -> Result<Distro> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(parse_os_release(&content))
}

pub fn parse_os_release(content: &str) -> Distro {
    let mut distro = Distro {
        os: Some("linux".to_string()),
        name: Some("linux".to_string()),
        identifier: Some("linux".to_string()),
        ..Default::default()
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, raw_value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = dequote(raw_value.trim());

        match key {
            "ID" => distro.identifier = Some(value),
            "NAME" => distro.name = Some(value),
            "VERSION" => distro.version = Some(value),
            "ID_LIKE" => distro.id_like = Some(value),
            "VERSION_CODENAME" => distro.version_codename = Some(value),
            "VERSION_ID" => distro.version_id = Some(value),
            "PRETTY_NAME" => distro.pretty_name = Some(value),
            "CPE_NAME" => distro.cpe_name = Some(value),
            "HOME_URL" => distro.home_url = Some(value),
            "DOCUMENTATION_URL" => distro.documentation_url = Some(value),
            "SUPPORT_URL" => distro.support_url = Some(value),
            "BUG_REPORT_URL" => distro.bug_report_url = Some(value),
            "PRIVACY_POLICY_URL" => distro.privacy_policy_url = Some(value),
            "BUILD_ID" => distro.build_id = Some(value),
            "VARIANT" => distro.variant = Some(value),
            "VARIANT_ID" => distro.variant_id = Some(value),
            "LOGO" => distro.logo = Some(value),
            other => {
                distro.extra.insert(other.to_string(), value);
            }
        }
    }

    distro
}

/// Reproduces POSIX shell-word dequoting for a single `os-release` value:
/// strips a matching pair of surrounding quotes and un-escapes the handful
/// of backslash sequences the format allows, which is all `shlex.split`
/// does for these single-line, single-token values.
fn dequote(value: &str) -> String {
    let trimmed = if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
        || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
    {
        &value[1..value.len() - 1]
    } else {
        value
    };

    let mut out = String::with_capacity(trimmed.len());
    let mut chars = trimmed.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if matches!(next, '"' | '\\' | '$' | '`') {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::FixtureWalker;

    #[test]
    fn parses_quoted_and_bare_values() {
        let content = "ID=ubuntu\nNAME=\"Ubuntu\"\nVERSION_ID=\"22.04\"\n# comment\nID_LIKE=debian\n";
        let distro = parse_os_release(content);
        assert_eq!(distro.identifier.as_deref(), Some("ubuntu"));
        assert_eq!(distro.name.as_deref(), Some("Ubuntu"));
        assert_eq!(distro.version_id.as_deref(), Some("22.04"));
        assert_eq!(distro.id_like.as_deref(), Some("debian"));
    }

    #[test]
    fn unrecognized_keys_go_to_extra() {
        let distro = parse_os_release("ID=fedora\nANSI_COLOR=\"0;38\"\n");
        assert_eq!(distro.extra.get("ANSI_COLOR").map(String::as_str), Some("0;38"));
    }

    #[test]
    fn find_root_requires_minimum_matches() {
        let walker = FixtureWalker::new(&["windows", "windows/system32", "users"], &[]);
        let dir = tempfile::tempdir().unwrap();
        let found = find_root(dir.path(), 3, WINDOWS_PATHS, 2, &walker);
        assert!(found.is_some());
    }

    #[test]
    fn find_root_returns_none_below_minimum() {
        let walker = FixtureWalker::new(&["windows"], &[]);
        let dir = tempfile::tempdir().unwrap();
        let found = find_root(dir.path(), 3, WINDOWS_PATHS, 2, &walker);
        assert!(found.is_none());
    }

    #[test]
    fn find_root_zero_depth_is_unbounded() {
        let walker = FixtureWalker::new(&["a/b/c/windows", "a/b/c/users", "a/b/c/program files"], &[]);
        let dir = tempfile::tempdir().unwrap();
        assert!(find_root(dir.path(), 3, WINDOWS_PATHS, 2, &walker).is_none());
        assert!(find_root(dir.path(), 0, WINDOWS_PATHS, 2, &walker).is_some());
    }

    #[test]
    fn find_linux_details_falls_back_to_layout_probe() {
        let walker = FixtureWalker::new(&["etc", "bin", "usr", "var"], &[]);
        let dir = tempfile::tempdir().unwrap();
        let distro = find_linux_details(dir.path(), &walker).unwrap();
        assert_eq!(distro.unwrap().os.as_deref(), Some("linux"));
    }

    #[test]
    fn find_linux_details_none_without_enough_markers() {
        let walker = FixtureWalker::new(&["etc"], &[]);
        let dir = tempfile::tempdir().unwrap();
        assert!(find_linux_details(dir.path(), &walker).unwrap().is_none());
    }
}
