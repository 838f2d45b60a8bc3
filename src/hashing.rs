//! # Checksums
//!
//! File hashing reads in fixed-size chunks, so memory use does not depend on
//! file size.

use crate::error::{FileOpError, IoResultExt, Result};
use crate::workspace::Workspace;
use serde::Serialize;
use sha1::Digest;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = FileOpError;

    fn from_str(s: &str) -> Result<Self> {
        HashAlgorithm::ALL
            .into_iter()
            .find(|algo| algo.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                FileOpError::InvalidArgument(format!(
                    "Invalid hash algorithm: {s}. Valid options are 'md5', 'sha1', 'sha256', 'sha512'."
                ))
            })
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FileHash {
    pub file_path: String,
    pub algorithm: HashAlgorithm,
    pub hash: String,
    pub file_size: u64,
}

pub fn calculate_file_hash(
    workspace: &Workspace,
    file_path: &str,
    hash_algorithm: &str,
    use_base_dir: bool,
) -> Result<FileHash> {
    let full_path = workspace.resolve(file_path, use_base_dir)?;
    if !full_path.is_file() {
        return Err(FileOpError::not_found("File", &full_path));
    }
    let algorithm: HashAlgorithm = hash_algorithm.parse()?;

    let (hash, file_size) = hash_path(&full_path, algorithm, workspace.limits().hash_chunk_size)?;
    Ok(FileHash {
        file_path: full_path.display().to_string(),
        algorithm,
        hash,
        file_size,
    })
}

/// Hashes a file, returning the lowercase hex digest and the number of bytes read.
pub(crate) fn hash_path(
    path: &Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> Result<(String, u64)> {
    match algorithm {
        HashAlgorithm::Md5 => digest_file::<md5::Md5>(path, chunk_size),
        HashAlgorithm::Sha1 => digest_file::<sha1::Sha1>(path, chunk_size),
        HashAlgorithm::Sha256 => digest_file::<sha2::Sha256>(path, chunk_size),
        HashAlgorithm::Sha512 => digest_file::<sha2::Sha512>(path, chunk_size),
    }
}

fn digest_file<D: Digest>(path: &Path, chunk_size: usize) -> Result<(String, u64)> {
    let mut file = File::open(path).with_path("open", path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let read = file.read(&mut buffer).with_path("read", path)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((hex::encode(hasher.finalize()), total))
}
