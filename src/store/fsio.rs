//! Durable file primitives: atomic replace and JSON Lines append.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::MemxResult;

/// Replace `path` atomically: write a sibling temp file, fsync, rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("state")
    ));
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

/// Serialize `value` as pretty JSON and replace `path` atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> MemxResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)?;
    Ok(())
}

/// Read a JSON file, `None` if it does not exist.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> MemxResult<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Append one JSON record as a line and flush it to disk. An unterminated
/// tail left by an earlier crash is cut first so the new record starts on a
/// line of its own.
pub fn append_json_line<T: Serialize>(path: &Path, value: &T) -> MemxResult<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;
    let cut = truncate_torn_tail(&mut file)?;
    if cut > 0 {
        log::warn!("cut {cut} torn bytes from {} before append", path.display());
    }
    file.write_all(&line)?;
    file.sync_data()?;
    Ok(())
}

/// Cut an unterminated final line from the JSON Lines file at `path`, if any.
/// Returns the number of bytes removed.
pub fn repair_json_lines(path: &Path) -> MemxResult<u64> {
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let cut = truncate_torn_tail(&mut file)?;
    if cut > 0 {
        log::warn!("cut {cut} torn bytes from the end of {}", path.display());
    }
    Ok(cut)
}

fn truncate_torn_tail(file: &mut File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(0);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(0);
    }

    let mut bytes = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut bytes)?;
    let keep = bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |p| p as u64 + 1);
    file.set_len(keep)?;
    file.sync_all()?;
    Ok(len - keep)
}

/// Read every record of a JSON Lines file. An unterminated or unparsable final
/// line (crash during append) is skipped with a warning; corruption elsewhere
/// is an error.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> MemxResult<Vec<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut lines: Vec<&[u8]> = bytes.split(|&b| b == b'\n').collect();
    // Everything after the last newline; empty when the file is well formed.
    let tail = lines.pop().unwrap_or_default();
    if !tail.iter().all(u8::is_ascii_whitespace) {
        log::warn!("skipping unterminated final record in {}", path.display());
    }

    let last = lines.len().saturating_sub(1);
    let mut records = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(record) => records.push(record),
            Err(e) if i == last && tail.is_empty() => {
                log::warn!("skipping torn final record in {}: {e}", path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}
