use crate::core::{RestoreError, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};

/// Line-oriented view over a logical dump.
///
/// The content is opaque: lines are handed to the driver as raw bytes, with
/// no encoding assumed and no parsing.
/// Reading is pull-based, so a slow driver naturally throttles disk reads, and
/// a single line longer than `max_line_bytes` aborts the stream instead of
/// growing without bound.
pub struct DumpStream {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    max_line_bytes: usize,
    lines_read: u64,
    bytes_read: u64,
}

impl DumpStream {
    pub fn new(reader: impl AsyncBufRead + Send + Unpin + 'static, max_line_bytes: usize) -> Self {
        Self {
            reader: Box::new(reader),
            max_line_bytes,
            lines_read: 0,
            bytes_read: 0,
        }
    }

    pub async fn open<P: AsRef<Path>>(path: P, max_line_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|err| {
            RestoreError::Io(format!("failed to open backup file at {}: {}", path.display(), err))
        })?;
        Ok(Self::new(BufReader::new(file), max_line_bytes))
    }

    /// Next line as raw bytes, without its terminator (`\n` or `\r\n`);
    /// `None` at end of stream. The cap applies to the line content, so the
    /// terminator never counts against it.
    pub async fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let limit = self.max_line_bytes as u64 + 2;
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        if buf.len() > self.max_line_bytes {
            return Err(RestoreError::Invalid(format!(
                "dump line {} exceeds {} bytes",
                self.lines_read + 1,
                self.max_line_bytes
            )));
        }

        self.lines_read += 1;
        self.bytes_read += n as u64;
        Ok(Some(buf))
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}
