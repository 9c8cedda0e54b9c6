use super::segment::{BinlogEvent, BinlogEventRecord, FIRST_EVENT_POSITION, LocalSegment, SEGMENT_MAGIC};
use crate::api::BinlogInfo;
use crate::core::{RestoreError, Result};
use std::collections::VecDeque;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};

struct SegmentCursor {
    segment: LocalSegment,
    reader: BufReader<File>,
    position: u64,
    is_tail: bool,
}

/// Lazy, forward-only walk over the mirrored binlog stream.
///
/// Starts at an exact coordinate, crosses segments in sequence order and stops
/// before the first event committed after `target_ts`. Every event is yielded
/// at most once and positions only ever move forward.
pub struct BinlogReplay {
    current: Option<SegmentCursor>,
    pending: VecDeque<LocalSegment>,
    target_ts: i64,
    max_event_bytes: usize,
    last: Option<(u64, u64)>,
    events_read: u64,
    finished: bool,
}

impl BinlogReplay {
    /// `segments` must be contiguous and start with the segment holding `start_position`.
    pub(crate) async fn open(
        segments: Vec<LocalSegment>,
        start_position: u64,
        target_ts: i64,
        max_event_bytes: usize,
    ) -> Result<Self> {
        let total = segments.len();
        let mut pending: VecDeque<LocalSegment> = segments.into();
        let first = pending.pop_front().ok_or_else(|| {
            RestoreError::Internal("binlog replay opened without segments".to_string())
        })?;
        let current = Self::open_segment(first, start_position, total == 1).await?;

        Ok(Self {
            current: Some(current),
            pending,
            target_ts,
            max_event_bytes,
            last: None,
            events_read: 0,
            finished: false,
        })
    }

    async fn open_segment(segment: LocalSegment, position: u64, is_tail: bool) -> Result<SegmentCursor> {
        let mut file = File::open(&segment.path).await.map_err(|err| {
            RestoreError::Io(format!("failed to open binlog segment {:?}: {}", segment.name, err))
        })?;
        let mut magic = [0u8; 4];
        let header = file.read_exact(&mut magic).await;
        if header.is_err() || &magic != SEGMENT_MAGIC {
            return Err(RestoreError::Invalid(format!(
                "binlog segment {:?} does not start with the segment magic",
                segment.name
            )));
        }
        file.seek(SeekFrom::Start(position)).await?;

        Ok(SegmentCursor {
            segment,
            reader: BufReader::new(file),
            position,
            is_tail,
        })
    }

    /// Next event at or before the target time, or `None` once the cut line,
    /// or the end of the mirrored stream, is reached.
    pub async fn next_event(&mut self) -> Result<Option<BinlogEvent>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            let Some(cursor) = self.current.as_mut() else {
                match self.pending.pop_front() {
                    Some(segment) => {
                        let is_tail = self.pending.is_empty();
                        self.current =
                            Some(Self::open_segment(segment, FIRST_EVENT_POSITION, is_tail).await?);
                        continue;
                    }
                    None => {
                        self.finished = true;
                        return Ok(None);
                    }
                }
            };

            // A record is at most `max_event_bytes` plus its newline.
            let mut line = Vec::new();
            let limit = self.max_event_bytes as u64 + 1;
            let n = (&mut cursor.reader)
                .take(limit)
                .read_until(b'\n', &mut line)
                .await?;
            if n == 0 {
                self.current = None;
                continue;
            }
            if n as u64 == limit && line.last() != Some(&b'\n') {
                return Err(RestoreError::Invalid(format!(
                    "binlog event at {}:{} exceeds {} bytes",
                    cursor.segment.name, cursor.position, self.max_event_bytes
                )));
            }
            if line.last() != Some(&b'\n') {
                // The source may still be writing the tail; an unterminated
                // record there is simply not committed to the mirror yet.
                if cursor.is_tail {
                    self.finished = true;
                    return Ok(None);
                }
                return Err(RestoreError::Invalid(format!(
                    "truncated binlog event at {}:{}",
                    cursor.segment.name, cursor.position
                )));
            }

            let position = cursor.position;
            cursor.position += n as u64;
            let record: BinlogEventRecord = serde_json::from_slice(&line[..n - 1]).map_err(|err| {
                RestoreError::Invalid(format!(
                    "malformed binlog event at {}:{}: {}",
                    cursor.segment.name, position, err
                ))
            })?;

            if record.ts > self.target_ts {
                self.finished = true;
                return Ok(None);
            }

            let key = (cursor.segment.sequence, position);
            if self.last.is_some_and(|last| key <= last) {
                return Err(RestoreError::Internal(format!(
                    "binlog replay moved backwards at {}:{}",
                    cursor.segment.name, position
                )));
            }
            self.last = Some(key);
            self.events_read += 1;

            return Ok(Some(BinlogEvent {
                coordinate: BinlogInfo::new(cursor.segment.name.clone(), position),
                end_position: cursor.position,
                timestamp: record.ts,
                statement: record.statement,
            }));
        }
    }

    /// Events yielded so far.
    pub fn events_read(&self) -> u64 {
        self.events_read
    }
}
