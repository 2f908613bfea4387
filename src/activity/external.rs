//! Read-only scanning of other agents' logs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde_json::Value;

use crate::config::{ExternalSource, SourceFormat};
use crate::types::{MemxResult, MICROS_PER_SEC};

/// Lines read from the end of a plain-text log.
const TEXT_TAIL_LINES: usize = 100;
/// Numeric timestamps above this are taken as milliseconds.
const MILLIS_THRESHOLD: f64 = 1e11;

const DEFAULT_PROJECT: &str = "External";
const TEXT_PROJECT: &str = "Log File";

/// One record from an external log.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRecord {
    pub source: String,
    pub project: String,
    /// Unix epoch microseconds.
    pub timestamp: u64,
    pub role: String,
    pub content: String,
}

/// Scan every source, keeping records at or after `cutoff`. A source that
/// cannot be read is logged and skipped.
pub fn scan_sources(sources: &[ExternalSource], cutoff: u64) -> Vec<ExternalRecord> {
    let mut records = Vec::new();
    for source in sources {
        match scan_source(source, cutoff) {
            Ok(found) => records.extend(found),
            Err(e) => log::warn!("Skipping external source {}: {e}", source.name),
        }
    }
    records
}

fn scan_source(source: &ExternalSource, cutoff: u64) -> MemxResult<Vec<ExternalRecord>> {
    let mut records = Vec::new();
    for file in source_files(&expand_home(&source.path))? {
        let modified = modified_micros(&file)?;
        if modified < cutoff {
            continue;
        }
        let found = match source.format {
            SourceFormat::Jsonl => parse_jsonl(source, &file, modified, cutoff)?,
            SourceFormat::Json => parse_json(source, &file, modified, cutoff)?,
            SourceFormat::Text => parse_text(source, &file, modified)?,
        };
        records.extend(found);
    }
    Ok(records)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

fn source_files(path: &Path) -> MemxResult<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        log::debug!("External source path {} does not exist", path.display());
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn modified_micros(path: &Path) -> MemxResult<u64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0))
}

fn parse_jsonl(
    source: &ExternalSource,
    path: &Path,
    file_ts: u64,
    cutoff: u64,
) -> MemxResult<Vec<ExternalRecord>> {
    let text = String::from_utf8_lossy(&fs::read(path)?).into_owned();
    Ok(text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|record| map_record(source, &record, file_ts, cutoff))
        .collect())
}

fn parse_json(
    source: &ExternalSource,
    path: &Path,
    file_ts: u64,
    cutoff: u64,
) -> MemxResult<Vec<ExternalRecord>> {
    let data: Value = serde_json::from_slice(&fs::read(path)?)?;
    let records = match &data {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("messages") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![data.clone()],
        },
        _ => Vec::new(),
    };
    Ok(records
        .iter()
        .filter_map(|record| map_record(source, record, file_ts, cutoff))
        .collect())
}

fn parse_text(source: &ExternalSource, path: &Path, file_ts: u64) -> MemxResult<Vec<ExternalRecord>> {
    let text = String::from_utf8_lossy(&fs::read(path)?).into_owned();
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(TEXT_TAIL_LINES);
    Ok(lines[start..]
        .iter()
        .map(|line| ExternalRecord {
            source: source.name.clone(),
            project: TEXT_PROJECT.to_string(),
            timestamp: file_ts,
            role: "system".to_string(),
            content: line.to_string(),
        })
        .collect())
}

fn map_record(
    source: &ExternalSource,
    record: &Value,
    file_ts: u64,
    cutoff: u64,
) -> Option<ExternalRecord> {
    let field = |name: &str| {
        source
            .mapping
            .get(name)
            .and_then(|path| extract_field(record, path))
    };

    let timestamp = field("timestamp").and_then(parse_timestamp).unwrap_or(file_ts);
    if timestamp < cutoff {
        return None;
    }
    let content = field("content").and_then(value_text)?;
    if content.trim().is_empty() {
        return None;
    }
    Some(ExternalRecord {
        source: source.name.clone(),
        project: field("project")
            .and_then(value_text)
            .unwrap_or_else(|| DEFAULT_PROJECT.to_string()),
        timestamp,
        role: field("role")
            .and_then(value_text)
            .unwrap_or_else(|| "unknown".to_string()),
        content,
    })
}

/// Follow a dotted path like `metadata.created_at`.
pub fn extract_field<'v>(record: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(record, |value, key| value.as_object()?.get(key))
}

/// Seconds or milliseconds since the epoch, or an RFC 3339 string, as micros.
pub fn parse_timestamp(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if raw <= 0.0 {
                return None;
            }
            let secs = if raw > MILLIS_THRESHOLD { raw / 1000.0 } else { raw };
            Some((secs * MICROS_PER_SEC as f64) as u64)
        }
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .and_then(|dt| u64::try_from(dt.timestamp_micros()).ok()),
        _ => None,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
