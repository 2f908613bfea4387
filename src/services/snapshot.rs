//! Archival tier: point-in-time snapshots of every persisted state file.

use std::io::{Error as IoError, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::fsio::{append_json_line, read_json_lines, write_atomic};
use crate::store::StoreLayout;
use crate::types::{now_micros, MemxError, MemxResult};

/// Magic bytes at the start of every snapshot bundle.
pub const BUNDLE_MAGIC: [u8; 8] = *b"MEMXSNAP";
/// Bundle format version.
pub const BUNDLE_VERSION: u32 = 1;

/// Checkpoint marker returned by a snapshotter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "ref")]
    pub reference: String,
    /// Unix epoch microseconds.
    pub timestamp: u64,
    pub summary: String,
}

/// Version-checkpoint collaborator.
pub trait Snapshotter: Send + Sync {
    /// Record the current persisted state under `message`.
    fn snapshot(&self, layout: &StoreLayout, message: &str) -> MemxResult<Snapshot>;

    /// Every snapshot recorded so far, oldest first.
    fn list(&self, layout: &StoreLayout) -> MemxResult<Vec<Snapshot>>;
}

/// Writes every state file into one LZ4-compressed bundle per snapshot.
///
/// Bundle layout: magic (8) | version u32 LE | lz4(size-prepended) payload,
/// where the payload is `count u32` followed by
/// `name_len u32 | name | data_len u64 | data` per file.
#[derive(Debug, Default)]
pub struct ArchiveSnapshotter;

impl ArchiveSnapshotter {
    pub fn new() -> Self {
        Self
    }

    /// Path of the bundle for `reference`.
    pub fn bundle_path(layout: &StoreLayout, reference: &str) -> PathBuf {
        layout.snapshots_dir().join(format!("{reference}.lz4"))
    }
}

impl Snapshotter for ArchiveSnapshotter {
    fn snapshot(&self, layout: &StoreLayout, message: &str) -> MemxResult<Snapshot> {
        let message = message.trim();
        if message.is_empty() {
            return Err(MemxError::Validation(
                "snapshot message must not be empty".to_string(),
            ));
        }

        let mut entries = Vec::new();
        for path in layout.state_files()? {
            let name = relative_name(layout.root(), &path);
            let data = std::fs::read(&path)?;
            entries.push((name, data));
        }
        let raw_bytes: usize = entries.iter().map(|(_, d)| d.len()).sum();
        let payload = encode_payload(&entries);

        let mut bundle = Vec::with_capacity(payload.len() / 2 + 12);
        bundle.extend_from_slice(&BUNDLE_MAGIC);
        bundle.extend_from_slice(&BUNDLE_VERSION.to_le_bytes());
        bundle.extend_from_slice(&lz4_flex::compress_prepend_size(&payload));

        let timestamp = now_micros();
        let reference = format!(
            "snap-{}-{:08x}",
            chrono::DateTime::from_timestamp_micros(timestamp as i64)
                .map(|dt| dt.format("%Y%m%dT%H%M%S%.6f").to_string())
                .unwrap_or_else(|| timestamp.to_string())
                .replace('.', ""),
            crc32fast::hash(&bundle)
        );
        write_atomic(&Self::bundle_path(layout, &reference), &bundle)?;

        let snapshot = Snapshot {
            reference,
            timestamp,
            summary: format!(
                "{message} ({} files, {} bytes -> {} bytes)",
                entries.len(),
                raw_bytes,
                bundle.len()
            ),
        };
        append_json_line(&layout.snapshot_index_path(), &snapshot)?;
        log::info!("Snapshot {} recorded: {}", snapshot.reference, snapshot.summary);
        Ok(snapshot)
    }

    fn list(&self, layout: &StoreLayout) -> MemxResult<Vec<Snapshot>> {
        let path = layout.snapshot_index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_json_lines(&path)
    }
}

/// Decode a bundle back into `(relative name, bytes)` pairs.
pub fn read_bundle(path: &Path) -> MemxResult<Vec<(String, Vec<u8>)>> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < 12 || bytes[..8] != BUNDLE_MAGIC {
        return Err(corrupt("bad snapshot magic"));
    }
    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if version != BUNDLE_VERSION {
        return Err(corrupt("unsupported snapshot version"));
    }
    let payload = lz4_flex::decompress_size_prepended(&bytes[12..])
        .map_err(|e| corrupt(&format!("decompression failed: {e}")))?;
    decode_payload(&payload)
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn encode_payload(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (name, data) in entries {
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}

fn decode_payload(payload: &[u8]) -> MemxResult<Vec<(String, Vec<u8>)>> {
    let mut cursor = Cursor { buf: payload, pos: 0 };
    let count = cursor.read_u32()? as usize;
    let mut entries = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let name_len = cursor.read_u32()? as usize;
        let name = String::from_utf8(cursor.take(name_len)?.to_vec())
            .map_err(|_| corrupt("snapshot entry name is not UTF-8"))?;
        let data_len = cursor.read_u64()? as usize;
        let data = cursor.take(data_len)?.to_vec();
        entries.push((name, data));
    }
    Ok(entries)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> MemxResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| corrupt("truncated snapshot payload"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> MemxResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> MemxResult<u64> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }
}

fn corrupt(msg: &str) -> MemxError {
    MemxError::Storage(IoError::new(ErrorKind::InvalidData, msg.to_string()))
}
