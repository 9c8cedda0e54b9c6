use super::replay::BinlogReplay;
use super::segment::{
    FIRST_EVENT_POSITION, LocalSegment, RemoteSegment, SEGMENT_MAGIC, segment_sequence,
    validate_segment_name,
};
use crate::api::BinlogInfo;
use crate::config::DEFAULT_MAX_BINLOG_EVENT_BYTES;
use crate::core::{RestoreError, Result};
use crate::driver::BinlogDriver;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{Level, event};
use uuid::Uuid;

lazy_static! {
    /// Write lock per mirror directory, shared by every coordinator in the process.
    static ref MIRROR_LOCKS: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>> = StdMutex::new(HashMap::new());
}

fn mirror_lock(dir: &Path) -> Arc<Mutex<()>> {
    let mut locks = MIRROR_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(dir.to_path_buf()).or_default().clone()
}

/// Outcome of one [`BinlogCoordinator::fetch_all`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Segments written (fully or extended).
    pub fetched: Vec<String>,
    /// Segments already complete in the mirror.
    pub skipped: Vec<String>,
    /// Bytes written across all segments.
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchAction {
    Skip,
    Whole,
    ExtendFrom(u64),
}

/// Local mirror of one source instance's binlog segments.
///
/// Closed segments are fetched once and never rewritten; the tail segment may
/// be refreshed any number of times. Fetch passes over one directory are
/// serialized, so each pass plans against a listing no older than the mirror
/// it writes to. Every write lands in a uniquely named temp file that is
/// renamed over the segment, and an extension never replaces a segment with
/// shorter content.
#[derive(Debug, Clone)]
pub struct BinlogCoordinator {
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
    max_event_bytes: usize,
}

impl BinlogCoordinator {
    /// Opens the mirror at `dir`, creating it on first use.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await.map_err(|err| {
            RestoreError::Io(format!("failed to create binlog directory {}: {}", dir.display(), err))
        })?;
        let key = fs::canonicalize(&dir).await.unwrap_or_else(|_| dir.clone());
        Ok(Self {
            write_lock: mirror_lock(&key),
            dir,
            max_event_bytes: DEFAULT_MAX_BINLOG_EVENT_BYTES,
        })
    }

    /// Set the cap on a single event record read during replay
    pub fn with_max_event_bytes(mut self, max: usize) -> Self {
        self.max_event_bytes = max;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Mirrored segments sorted by sequence.
    pub async fn segments(&self) -> Result<Vec<LocalSegment>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut segments = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let sequence = match segment_sequence(&name) {
                Ok(sequence) => sequence,
                Err(err) => {
                    event!(Level::WARN, file = %name, error = %err, "ignoring file in binlog mirror");
                    continue;
                }
            };
            segments.push(LocalSegment {
                name,
                sequence,
                size: metadata.len(),
                path: entry.path(),
            });
        }

        segments.sort_by(|a, b| a.sequence.cmp(&b.sequence));
        if let Some(pair) = segments.windows(2).find(|w| w[0].sequence == w[1].sequence) {
            return Err(RestoreError::Internal(format!(
                "binlog segments {:?} and {:?} share sequence {}",
                pair[0].name, pair[1].name, pair[0].sequence
            )));
        }
        Ok(segments)
    }

    /// Brings the mirror up to date with the source.
    ///
    /// Missing segments are fetched whole and short closed segments are
    /// completed. With `refresh_tail` the most recent segment is always read
    /// again, since the source may still be appending to it.
    ///
    /// Concurrent passes over the same directory run one after another; the
    /// later pass lists the source again and only adds what is still missing.
    pub async fn fetch_all(
        &self,
        driver: &mut dyn BinlogDriver,
        refresh_tail: bool,
    ) -> Result<FetchReport> {
        let _writer = self.write_lock.lock().await;

        let mut remote = Vec::new();
        for segment in driver.list_binlog_segments().await? {
            validate_segment_name(&segment.name)?;
            remote.push((segment_sequence(&segment.name)?, segment));
        }
        remote.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = remote.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(RestoreError::Internal(format!(
                "source binlog segments {:?} and {:?} share sequence {}",
                pair[0].1.name, pair[1].1.name, pair[0].0
            )));
        }

        let mut report = FetchReport::default();
        let tail_index = remote.len().saturating_sub(1);
        for (index, (_, segment)) in remote.iter().enumerate() {
            let is_tail = index == tail_index;
            let local_size = self.local_size(&segment.name).await?;
            let action = Self::plan_fetch(segment, local_size, is_tail, refresh_tail)?;

            match action {
                FetchAction::Skip => {
                    report.skipped.push(segment.name.clone());
                    continue;
                }
                FetchAction::Whole => {
                    let bytes = driver.read_binlog_segment(&segment.name, 0).await?;
                    if !bytes.starts_with(SEGMENT_MAGIC) {
                        return Err(RestoreError::Invalid(format!(
                            "source binlog segment {:?} does not start with the segment magic",
                            segment.name
                        )));
                    }
                    self.replace_segment(&segment.name, None, &bytes).await?;
                    report.bytes += bytes.len() as u64;
                }
                FetchAction::ExtendFrom(offset) => {
                    let bytes = driver.read_binlog_segment(&segment.name, offset).await?;
                    if !bytes.is_empty()
                        && !self.replace_segment(&segment.name, Some(offset), &bytes).await?
                    {
                        report.skipped.push(segment.name.clone());
                        continue;
                    }
                    report.bytes += bytes.len() as u64;
                }
            }
            event!(
                Level::DEBUG,
                segment = %segment.name,
                action = ?action,
                tail = is_tail,
                "binlog segment fetched"
            );
            report.fetched.push(segment.name.clone());
        }

        event!(
            Level::INFO,
            dir = %self.dir.display(),
            fetched = report.fetched.len(),
            skipped = report.skipped.len(),
            bytes = report.bytes,
            "binlog mirror refreshed"
        );
        Ok(report)
    }

    fn plan_fetch(
        segment: &RemoteSegment,
        local_size: Option<u64>,
        is_tail: bool,
        refresh_tail: bool,
    ) -> Result<FetchAction> {
        let Some(local_size) = local_size else {
            return Ok(FetchAction::Whole);
        };

        if is_tail && refresh_tail {
            // A tail shorter than the mirror means the source rewrote it.
            return Ok(if local_size > segment.size || local_size < FIRST_EVENT_POSITION {
                FetchAction::Whole
            } else {
                FetchAction::ExtendFrom(local_size)
            });
        }

        if local_size == segment.size || is_tail {
            return Ok(FetchAction::Skip);
        }
        if local_size < FIRST_EVENT_POSITION {
            return Ok(FetchAction::Whole);
        }
        if local_size < segment.size {
            return Ok(FetchAction::ExtendFrom(local_size));
        }
        Err(RestoreError::Internal(format!(
            "mirrored binlog segment {:?} holds {} bytes but the source reports {}",
            segment.name, local_size, segment.size
        )))
    }

    async fn local_size(&self, name: &str) -> Result<Option<u64>> {
        match fs::metadata(self.dir.join(name)).await {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes the new segment content to a temp file and renames it into place.
    /// With `keep_prefix`, the first `keep_prefix` bytes of the current local
    /// copy are carried over and `bytes` is appended after them; the write is
    /// dropped, returning `false`, when the local copy is already at least as
    /// long as the extended content.
    async fn replace_segment(&self, name: &str, keep_prefix: Option<u64>, bytes: &[u8]) -> Result<bool> {
        let path = self.dir.join(name);
        let tmp_path = self.dir.join(format!(".{}.tmp-{}", name, Uuid::new_v4().simple()));

        let result = async {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .await?;
            if let Some(prefix_len) = keep_prefix {
                let mut prefix = Vec::with_capacity(prefix_len as usize);
                fs::File::open(&path)
                    .await?
                    .take(prefix_len)
                    .read_to_end(&mut prefix)
                    .await?;
                if prefix.len() as u64 != prefix_len {
                    return Err(RestoreError::Io(format!(
                        "binlog segment {:?} shrank while being extended",
                        name
                    )));
                }
                tmp.write_all(&prefix).await?;
            }
            tmp.write_all(bytes).await?;
            tmp.flush().await?;
            tmp.sync_data().await?;

            if let Some(prefix_len) = keep_prefix {
                let extended = prefix_len + bytes.len() as u64;
                let current = fs::metadata(&path).await?.len();
                if current >= extended {
                    event!(
                        Level::DEBUG,
                        segment = %name,
                        local = current,
                        extended,
                        "mirror already holds the extended segment"
                    );
                    return Ok(false);
                }
            }
            fs::rename(&tmp_path, &path).await?;
            Ok::<bool, RestoreError>(true)
        }
        .await;

        if !matches!(result, Ok(true)) {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    /// Whether `info` addresses a record boundary inside the mirror.
    pub async fn contains(&self, info: &BinlogInfo) -> Result<bool> {
        if info.is_empty() {
            return Ok(false);
        }
        let segments = self.segments().await?;
        let Some(segment) = segments.iter().find(|s| s.name == info.file_name) else {
            return Ok(false);
        };
        Self::is_record_boundary(segment, info.position).await
    }

    pub(crate) async fn is_record_boundary(segment: &LocalSegment, position: u64) -> Result<bool> {
        if position < FIRST_EVENT_POSITION || position > segment.size {
            return Ok(false);
        }
        let mut file = fs::File::open(&segment.path).await?;
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).await?;
        if &magic != SEGMENT_MAGIC {
            return Ok(false);
        }
        if position == FIRST_EVENT_POSITION {
            return Ok(true);
        }
        file.seek(SeekFrom::Start(position - 1)).await?;
        let mut previous = [0u8; 1];
        file.read_exact(&mut previous).await?;
        Ok(previous[0] == b'\n')
    }

    /// Replay cursor starting exactly at `start`, bounded by `target_ts` (inclusive).
    pub async fn replay_from(&self, start: &BinlogInfo, target_ts: i64) -> Result<BinlogReplay> {
        let segments = self.segments().await?;
        let start_index = segments
            .iter()
            .position(|s| s.name == start.file_name)
            .ok_or_else(|| {
                RestoreError::NotFound(format!(
                    "binlog segment {:?} is not in the local mirror {}",
                    start.file_name,
                    self.dir.display()
                ))
            })?;
        if !Self::is_record_boundary(&segments[start_index], start.position).await? {
            return Err(RestoreError::Invalid(format!(
                "binlog coordinate {} is not an event boundary in the local mirror",
                start
            )));
        }

        let remaining: Vec<LocalSegment> = segments.into_iter().skip(start_index).collect();
        if let Some(pair) = remaining.windows(2).find(|w| w[1].sequence != w[0].sequence + 1) {
            return Err(RestoreError::Internal(format!(
                "binlog mirror is missing segments between {:?} and {:?}",
                pair[0].name, pair[1].name
            )));
        }

        BinlogReplay::open(remaining, start.position, target_ts, self.max_event_bytes).await
    }
}
