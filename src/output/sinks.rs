//! In-process and file-backed record sinks

use crate::crawler::SessionReport;
use crate::output::traits::{ContentRecord, RecordSink, SinkError, SinkResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Forwards every record into a bounded tokio channel
///
/// `write` blocks while the channel is full, so a slow consumer applies
/// back-pressure to the crawl instead of records piling up in memory.
pub struct ChannelSink {
    sender: mpsc::Sender<ContentRecord>,
}

impl ChannelSink {
    /// Creates a sink together with the receiving half of its channel
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ContentRecord>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn from_sender(sender: mpsc::Sender<ContentRecord>) -> Self {
        Self { sender }
    }
}

impl RecordSink for ChannelSink {
    fn write(&self, record: &ContentRecord) -> SinkResult<()> {
        self.sender
            .blocking_send(record.clone())
            .map_err(|_| SinkError::Closed)
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Creates (or truncates) the file at `path`
    pub fn create(path: &Path) -> SinkResult<Self> {
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonLinesSink {
    fn write(&self, record: &ContentRecord) -> SinkResult<()> {
        let line = serde_json::to_string(record)?;

        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SinkError::Write(format!("Failed to lock writer: {}", e)))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&self, _report: &SessionReport) -> SinkResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SinkError::Write(format!("Failed to lock writer: {}", e)))?;
        writer.flush()?;
        Ok(())
    }
}

/// Fans every record out to several sinks
///
/// All sinks are attempted even if one fails; the first error is returned.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn RecordSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn RecordSink>) {
        self.sinks.push(sink);
    }

    pub fn with(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl RecordSink for MultiSink {
    fn write(&self, record: &ContentRecord) -> SinkResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.write(record) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn finish(&self, report: &SessionReport) -> SinkResult<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.finish(report) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
