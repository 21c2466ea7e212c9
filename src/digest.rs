//! Content digests: parsing, canonical rendering, and computation.

use crate::error::{Error, Result};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Sha256,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A content digest, always held in its bare (unprefixed) hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Digest {
    algorithm: Algorithm,
    hex: String,
}

impl Digest {
    pub fn sha256(hex: impl Into<String>) -> Self {
        Digest {
            algorithm: Algorithm::Sha256,
            hex: hex.into(),
        }
    }

    /// Parses either a bare hex digest or an `<algorithm>:<hex>`-prefixed one.
    /// A bare digest is assumed to be sha256, the only algorithm this crate
    /// supports end to end.
    pub fn parse(s: &str) -> Option<Self> {
        match s.split_once(':') {
            Some(("sha256", hex)) => Some(Digest::sha256(hex)),
            Some((_, _)) => None,
            None if !s.is_empty() => Some(Digest::sha256(s)),
            None => None,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex digest with no algorithm prefix.
    pub fn bare(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> String {
        d.to_string()
    }
}

impl TryFrom<String> for Digest {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, String> {
        Digest::parse(&s).ok_or_else(|| format!("not a valid digest: {s:?}"))
    }
}

/// Computes the sha256 digest of a file's contents.
pub fn sha256_digest(path: &Path) -> Result<Digest> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Digest::sha256(hex_lower(&hasher.finalize())))
}

/// Computes the sha256 digest of an arbitrary reader's contents, consuming it.
pub fn sha256_digest_reader(mut reader: impl Read) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Digest::sha256(hex_lower(&hasher.finalize())))
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_and_bare() {
        let a = Digest::parse("sha256:deadbeef").unwrap();
        let b = Digest::parse("deadbeef").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.bare(), "deadbeef");
        assert_eq!(a.to_string(), "sha256:deadbeef");
    }

    #[test]
    fn rejects_unknown_algorithm() {
        assert!(Digest::parse("sha512:deadbeef").is_none());
    }

    #[test]
    fn digests_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello");
        std::fs::write(&path, b"hello\n").unwrap();
        let digest = sha256_digest(&path).unwrap();
        // sha256("hello\n")
        assert_eq!(
            digest.bare(),
            "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be0"
        );
    }

    #[test]
    fn digest_is_stable_across_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"some layer content").unwrap();
        assert_eq!(sha256_digest(&path).unwrap(), sha256_digest(&path).unwrap());
    }
}
