use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

pub fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    fs::create_dir_all(path.as_ref())
        .with_context(|| format!("create_dir_all {}", path.as_ref().display()))
}

pub fn list_files_recursive(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(path.as_ref()) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.path().to_path_buf());
        }
    }
    // Stable input order regardless of directory walk order
    files.sort();
    Ok(files)
}

/// Streams a file's lines, split on `\n` at the byte level and decoded
/// lossily. A line with invalid UTF-8 reaches the caller as a string with
/// replacement characters and fails that record's parse downstream instead
/// of aborting the whole file; only real IO errors surface as `Err`.
pub fn read_lines(path: impl AsRef<Path>) -> Result<impl Iterator<Item = Result<String>>> {
    let file = File::open(path.as_ref())
        .with_context(|| format!("open {}", path.as_ref().display()))?;
    let mut reader = BufReader::new(file);
    Ok(std::iter::from_fn(move || {
        let mut raw = Vec::new();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) => None,
            Ok(_) => {
                if raw.last() == Some(&b'\n') {
                    raw.pop();
                    if raw.last() == Some(&b'\r') {
                        raw.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&raw).into_owned()))
            }
            Err(e) => Some(Err(anyhow::Error::from(e))),
        }
    }))
}

pub fn open_writer(path: impl AsRef<Path>) -> Result<BufWriter<File>> {
    if let Some(parent) = path.as_ref().parent() {
        ensure_dir(parent)?;
    }
    let file = File::create(path.as_ref())
        .with_context(|| format!("create {}", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

/// Deterministic key partitioning: DefaultHasher is keyed with fixed zeros,
/// so the same key lands on the same partition in every run and process.
pub fn hash_to_partition<K: Serialize>(key: &K, num_partitions: usize) -> Result<usize> {
    let bytes = bincode::serialize(key).context("serialize partition key")?;
    let mut hasher = DefaultHasher::new();
    hasher.write(&bytes);
    Ok((hasher.finish() as usize) % num_partitions)
}

// Intermediate shuffle file format is binary records: [klen u32][vlen u32][key][val],
// lengths little-endian.

pub fn push_record(buf: &mut Vec<u8>, key: &[u8], val: &[u8]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(val.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(val);
}

/// Reads one framed record at `off`, returning key bytes, value bytes and the
/// offset of the next record. `None` on a clean end of buffer or a truncated
/// tail.
pub fn read_record(bytes: &[u8], off: usize) -> Option<(&[u8], &[u8], usize)> {
    if off + 8 > bytes.len() {
        return None;
    }
    let klen = u32::from_le_bytes(bytes[off..off + 4].try_into().ok()?) as usize;
    let vlen = u32::from_le_bytes(bytes[off + 4..off + 8].try_into().ok()?) as usize;
    let key_start = off + 8;
    let key_end = key_start.checked_add(klen)?;
    let val_end = key_end.checked_add(vlen)?;
    if val_end > bytes.len() {
        return None;
    }
    Some((&bytes[key_start..key_end], &bytes[key_end..val_end], val_end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip() {
        let mut buf = Vec::new();
        push_record(&mut buf, b"key-a", b"1");
        push_record(&mut buf, b"key-b", b"22");
        let (k, v, next) = read_record(&buf, 0).unwrap();
        assert_eq!((k, v), (&b"key-a"[..], &b"1"[..]));
        let (k, v, next) = read_record(&buf, next).unwrap();
        assert_eq!((k, v), (&b"key-b"[..], &b"22"[..]));
        assert!(read_record(&buf, next).is_none());
    }

    #[test]
    fn truncated_record_is_rejected() {
        let mut buf = Vec::new();
        push_record(&mut buf, b"key", b"value");
        assert!(read_record(&buf[..buf.len() - 1], 0).is_none());
        assert!(read_record(&buf[..4], 0).is_none());
    }

    #[test]
    fn non_utf8_line_is_decoded_lossily_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.jsonl");
        let mut body = b"first\r\n".to_vec();
        body.extend_from_slice(&[0xff, 0xfe, b'\n']);
        body.extend_from_slice(b"last");
        fs::write(&path, body).unwrap();
        let lines: Vec<String> = read_lines(&path)
            .unwrap()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["first", "\u{fffd}\u{fffd}", "last"]);
    }

    #[test]
    fn partitioning_is_stable() {
        let p1 = hash_to_partition(&"category:Books".to_string(), 7).unwrap();
        let p2 = hash_to_partition(&"category:Books".to_string(), 7).unwrap();
        assert_eq!(p1, p2);
        assert!(p1 < 7);
    }
}
