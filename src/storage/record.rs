use anyhow::{Context, Result};
use bincode::{Decode, Encode};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// One serialized history entry. Length-framed by bincode, so arbitrary
/// text round-trips exactly and replay can detect a clean end-of-stream.
#[derive(Debug, Encode, Decode, PartialEq)]
struct Record {
    text: String,
}

/// Append-only sequential store of text records.
///
/// `replay` yields every record oldest-first; `append` must leave the
/// record durably flushed before returning. The stream is never compacted,
/// so the backing file grows beyond the in-memory history capacity.
pub trait RecordStore {
    fn replay(&mut self) -> Result<Vec<String>>;
    fn append(&mut self, text: &str) -> Result<()>;
}

/// File-backed record store using bincode framing.
pub struct FileRecordStore {
    path: PathBuf,
    appender: Option<File>,
}

impl FileRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileRecordStore {
            path: path.into(),
            appender: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_appender(&mut self) -> Result<&mut File> {
        if self.appender.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open history file {:?}", self.path))?;
            self.appender = Some(file);
        }

        self.appender
            .as_mut()
            .with_context(|| format!("History appender unavailable for {:?}", self.path))
    }
}

impl RecordStore for FileRecordStore {
    fn replay(&mut self) -> Result<Vec<String>> {
        if !self.path.exists() {
            log::info!("History file not found at {:?}, starting empty", self.path);
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to read history from {:?}", self.path))?;
        let mut reader = BufReader::new(file);

        let mut records = Vec::new();
        loop {
            match bincode::decode_from_std_read::<Record, _, _>(
                &mut reader,
                bincode::config::standard(),
            ) {
                Ok(record) => records.push(record.text),
                Err(bincode::error::DecodeError::UnexpectedEnd { .. }) => break,
                Err(bincode::error::DecodeError::Io { inner, .. })
                    if inner.kind() == ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Corrupt history record in {:?}", self.path))
                }
            }
        }

        log::info!("Replayed {} records from {:?}", records.len(), self.path);
        Ok(records)
    }

    fn append(&mut self, text: &str) -> Result<()> {
        let record = Record {
            text: text.to_string(),
        };
        let path = self.path.clone();
        let file = self.open_appender()?;

        bincode::encode_into_std_write(&record, file, bincode::config::standard())
            .with_context(|| format!("Failed to serialize record to {:?}", path))?;

        file.flush()
            .and_then(|_| file.sync_data())
            .with_context(|| format!("Failed to flush history record to {:?}", path))?;

        Ok(())
    }
}
