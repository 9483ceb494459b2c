use crate::error::{Error, Result};
use crate::traits::{Memory, MemoryRecord};
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::PathBuf;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

/// Newline-delimited JSON store. Appends are serialized; reads take no lock
/// and only consider newline-terminated lines, so an in-flight append is either
/// fully visible or not visible at all. An unterminated tail left by an
/// interrupted write is cut off before the next append.
pub struct FileMemory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Truncates `file` back to its last newline when a previous write was cut
    /// short. Must be called with `write_lock` held.
    async fn discard_torn_tail(&self, file: &mut File) -> Result<()> {
        let len = file.metadata().await?.len();
        if len == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::Start(len - 1)).await?;
        file.read_exact(&mut last).await?;
        if last[0] == b'\n' {
            return Ok(());
        }

        let data = fs::read(&self.path).await?;
        let keep = data
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |end| end + 1) as u64;

        tracing::warn!(
            path = %self.path.display(),
            discarded = len.saturating_sub(keep),
            "Discarding incomplete trailing record"
        );
        file.set_len(keep).await?;
        Ok(())
    }
}

#[async_trait]
impl Memory for FileMemory {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, key: &str, value: &str) -> Result<MemoryRecord> {
        if key.trim().is_empty() {
            return Err(Error::Validation("memory key cannot be empty".to_string()));
        }

        let record = MemoryRecord::new(key, value);
        let mut line = serde_json::to_vec(&record).map_err(Error::storage)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                tracing::error!(path = %self.path.display(), "Failed to open memory file: {}", e);
                Error::storage(format!("{}: {}", self.path.display(), e))
            })?;

        self.discard_torn_tail(&mut file).await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::debug!(key, "Memory appended");
        Ok(record)
    }

    async fn all(&self) -> Result<Vec<MemoryRecord>> {
        let data = match fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                tracing::error!(path = %self.path.display(), "Failed to read memory file: {}", e);
                return Err(Error::storage(format!("{}: {}", self.path.display(), e)));
            }
        };

        let complete = match data.iter().rposition(|b| *b == b'\n') {
            Some(end) => &data[..=end],
            None => return Ok(Vec::new()),
        };

        let mut records = Vec::new();
        for (index, line) in complete.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let record: MemoryRecord = serde_json::from_slice(line).map_err(|e| {
                Error::storage(format!(
                    "corrupt record at {}:{}: {}",
                    self.path.display(),
                    index + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        Ok(records)
    }
}
