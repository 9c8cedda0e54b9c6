//! Mirror segment format.
//!
//! A segment starts with the 4-byte magic `\xfebin`, followed by
//! newline-terminated JSON event records. An event's position is the byte
//! offset of its first byte, so the first event of every segment sits at
//! position 4. A binlog coordinate names the first event *not* yet applied:
//! always a record boundary or the end of the segment.

use crate::api::BinlogInfo;
use crate::core::{RestoreError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const SEGMENT_MAGIC: &[u8; 4] = b"\xfebin";

/// Position of the first event in a segment.
pub const FIRST_EVENT_POSITION: u64 = SEGMENT_MAGIC.len() as u64;

lazy_static! {
    static ref SEGMENT_SEQUENCE: Regex = Regex::new(r"(\d+)$").unwrap();
}

/// Sequence embedded at the end of a segment name: `binlog.000012` -> 12.
pub fn segment_sequence(name: &str) -> Result<u64> {
    let digits = SEGMENT_SEQUENCE
        .captures(name)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| {
            RestoreError::Invalid(format!("binlog segment name {:?} has no sequence suffix", name))
        })?;
    digits.as_str().parse::<u64>().map_err(|err| {
        RestoreError::Invalid(format!("binlog segment name {:?}: {}", name, err))
    })
}

/// Segment names become file names in the mirror; anything that could escape
/// the mirror directory or collide with temp files is rejected.
pub fn validate_segment_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(RestoreError::Invalid(format!(
            "binlog segment name {:?} is not a plain file name",
            name
        )));
    }
    segment_sequence(name).map(|_| ())
}

/// One record as stored in a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinlogEventRecord {
    /// Commit time, unix seconds.
    pub ts: i64,
    pub statement: String,
}

impl BinlogEventRecord {
    pub fn new(ts: i64, statement: impl Into<String>) -> Self {
        Self {
            ts,
            statement: statement.into(),
        }
    }

    /// Record bytes including the trailing newline.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self).map_err(|err| {
            RestoreError::Internal(format!("serialize binlog event: {}", err))
        })?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Complete segment bytes: magic followed by the encoded records.
pub fn encode_segment(records: &[BinlogEventRecord]) -> Result<Vec<u8>> {
    let mut bytes = SEGMENT_MAGIC.to_vec();
    for record in records {
        bytes.extend(record.encode()?);
    }
    Ok(bytes)
}

/// A decoded event together with where it lives in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinlogEvent {
    /// Segment and position of the event's first byte.
    pub coordinate: BinlogInfo,
    /// Position just past the event; the coordinate of the next one.
    pub end_position: u64,
    pub timestamp: i64,
    pub statement: String,
}

/// A segment as listed by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSegment {
    pub name: String,
    pub size: u64,
}

impl RemoteSegment {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// A segment present in the local mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSegment {
    pub name: String,
    pub sequence: u64,
    pub size: u64,
    pub path: PathBuf,
}
