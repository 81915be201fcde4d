use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, TallyError};

const CHUNK_SIZE: usize = 8192;

/// Hex SHA-256 of the file's bytes, read in fixed-size chunks.
pub fn hash_file(path: &Path) -> Result<String> {
    hash_path(path).map_err(|source| TallyError::Hash {
        path: path.to_path_buf(),
        source,
    })
}

fn hash_path(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
