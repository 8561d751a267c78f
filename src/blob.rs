//! Content hashing and compressed blob I/O.
//!
//! Stored blobs are named by [`namehash`] — a SHA-256 of the
//! workspace-relative path string, not of the content. When the repository's
//! `compress` flag is set, blobs are gzip streams; readers and writers here
//! make that transparent to the rest of the crate.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Hash of a workspace-relative path string, used as the blob filename.
pub fn namehash(path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hex(&hasher.finalize())
}

/// Streaming SHA-256 of a file's content.
pub fn content_hash(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex(&hasher.finalize()))
}

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Stream-copy a live file into a blob, compressing when configured.
pub fn write_blob(src: &Path, blob: &Path, compress: bool) -> Result<()> {
    let input = File::open(src).map_err(|e| Error::io(src, e))?;
    let mut reader = BufReader::new(input);
    let output = File::create(blob).map_err(|e| Error::io(blob, e))?;

    if compress {
        let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
        std::io::copy(&mut reader, &mut encoder).map_err(|e| Error::io(blob, e))?;
        encoder.finish().map_err(|e| Error::io(blob, e))?;
    } else {
        let mut writer = BufWriter::new(output);
        std::io::copy(&mut reader, &mut writer).map_err(|e| Error::io(blob, e))?;
        writer.flush().map_err(|e| Error::io(blob, e))?;
    }
    Ok(())
}

/// Read a blob's content into memory, decompressing when configured.
pub fn read_blob(blob: &Path, compressed: bool) -> Result<Vec<u8>> {
    let file = File::open(blob).map_err(|e| Error::io(blob, e))?;
    let mut out = Vec::new();
    if compressed {
        let mut decoder = GzDecoder::new(BufReader::new(file));
        decoder.read_to_end(&mut out).map_err(|e| Error::io(blob, e))?;
    } else {
        BufReader::new(file)
            .read_to_end(&mut out)
            .map_err(|e| Error::io(blob, e))?;
    }
    Ok(out)
}

/// Stream a blob back out to a live file, creating parent directories.
pub fn restore_blob(blob: &Path, dest: &Path, compressed: bool) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let input = File::open(blob).map_err(|e| Error::io(blob, e))?;
    let output = File::create(dest).map_err(|e| Error::io(dest, e))?;
    let mut writer = BufWriter::new(output);

    if compressed {
        let mut decoder = GzDecoder::new(BufReader::new(input));
        std::io::copy(&mut decoder, &mut writer).map_err(|e| Error::io(dest, e))?;
    } else {
        let mut reader = BufReader::new(input);
        std::io::copy(&mut reader, &mut writer).map_err(|e| Error::io(dest, e))?;
    }
    writer.flush().map_err(|e| Error::io(dest, e))?;
    Ok(())
}

/// Copy a stored blob between revision directories without recoding.
/// Both sides share one repository-wide compression setting.
pub fn copy_blob(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::copy(src, dest).map_err(|e| Error::io(dest, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namehash_is_stable_and_path_sensitive() {
        assert_eq!(namehash("src/main.rs"), namehash("src/main.rs"));
        assert_ne!(namehash("src/main.rs"), namehash("src/lib.rs"));
        assert_eq!(namehash("a").len(), 64);
    }

    #[test]
    fn content_hash_is_sha256_of_the_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("f.txt");
        std::fs::write(&p, b"hello shelf").unwrap();
        assert_eq!(
            content_hash(&p).unwrap(),
            "36bf0cb1e16ce25c61a2a17850928330a2b5ecf08b4a9d30cf9f5fad29f8c1a4"
        );
    }

    #[test]
    fn blob_roundtrip_plain_and_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let data: Vec<u8> = (0..10_000u32).flat_map(|i| i.to_le_bytes()).collect();
        std::fs::write(&src, &data).unwrap();

        for compress in [false, true] {
            let blob = dir.path().join(format!("blob-{}", compress));
            write_blob(&src, &blob, compress).unwrap();
            assert_eq!(read_blob(&blob, compress).unwrap(), data);

            let restored = dir.path().join(format!("deep/out-{}", compress));
            restore_blob(&blob, &restored, compress).unwrap();
            assert_eq!(std::fs::read(&restored).unwrap(), data);
        }
    }

    #[test]
    fn compressed_blob_is_smaller_for_redundant_content() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        std::fs::write(&src, "same line\n".repeat(500)).unwrap();

        let blob = dir.path().join("blob.gz");
        write_blob(&src, &blob, true).unwrap();
        let plain = std::fs::metadata(&src).unwrap().len();
        let packed = std::fs::metadata(&blob).unwrap().len();
        assert!(packed < plain);
    }
}
