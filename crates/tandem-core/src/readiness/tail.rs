use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

/// Incremental reader of a growing file, yielding complete lines only.
#[derive(Debug)]
pub(crate) struct LogTail {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start over from the beginning, e.g. after the file was recreated.
    pub fn rewind(&mut self) {
        self.offset = 0;
        self.pending.clear();
    }

    /// Read whatever was appended since the last poll. A missing file
    /// yields nothing.
    pub async fn poll(&mut self) -> io::Result<Vec<String>> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        if len < self.offset {
            tracing::debug!("{} was truncated, rereading", self.path.display());
            self.rewind();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::new();
        file.take(len - self.offset).read_to_end(&mut chunk).await?;
        self.offset += chunk.len() as u64;
        self.pending.extend_from_slice(&chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            lines.push(line.trim_end_matches(['\r', '\n']).to_owned());
        }
        Ok(lines)
    }
}
