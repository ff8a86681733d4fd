//! Event sinks.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use crate::event::MetricEvent;

/// Error type for publishing events.
#[derive(Debug)]
pub enum SinkError {
    /// Writing the event failed.
    Io(io::Error),
    /// The event could not be encoded.
    Encode(serde_json::Error),
    /// The sink refused the event.
    Rejected(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "I/O error: {}", e),
            SinkError::Encode(e) => write!(f, "encode error: {}", e),
            SinkError::Rejected(msg) => write!(f, "event rejected: {}", msg),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<io::Error> for SinkError {
    fn from(e: io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Encode(e)
    }
}

/// Destination for published events.
pub trait Sink {
    fn publish(&mut self, event: &MetricEvent) -> Result<(), SinkError>;
}

/// Writes one JSON object per line and flushes after every event.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Appends to `path`, creating the file if needed.
    pub fn append(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> Sink for JsonLinesSink<W> {
    fn publish(&mut self, event: &MetricEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn publish(&mut self, event: &MetricEvent) -> Result<(), SinkError> {
        (**self).publish(event)
    }
}

/// Keeps published events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<MetricEvent>,
    /// Reject every event after this many have been accepted.
    pub fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(accepted: usize) -> Self {
        Self {
            events: Vec::new(),
            fail_after: Some(accepted),
        }
    }
}

impl Sink for MemorySink {
    fn publish(&mut self, event: &MetricEvent) -> Result<(), SinkError> {
        if self.fail_after.is_some_and(|limit| self.events.len() >= limit) {
            return Err(SinkError::Rejected("memory sink is full".to_string()));
        }
        self.events.push(event.clone());
        Ok(())
    }
}
