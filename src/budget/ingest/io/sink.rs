use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::budget::ingest::error::{IngestError, Result};

/// Destination of the records produced by a run. Records are appended one at
/// a time and the first failure ends the run.
pub trait RecordSink<T> {
    fn append(&mut self, item: &T) -> Result<()>;

    /// Flushes whatever the sink buffers. Called once after the last append.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source of the highest id already persisted.
pub trait HighWaterMark {
    /// Returns the highest persisted id, `0` when nothing was persisted yet.
    fn high_water_mark(&self) -> Result<u64>;
}

impl HighWaterMark for u64 {
    fn high_water_mark(&self) -> Result<u64> {
        Ok(*self)
    }
}

impl<T: Clone> RecordSink<T> for Vec<T> {
    fn append(&mut self, item: &T) -> Result<()> {
        self.push(item.clone());
        Ok(())
    }
}

impl<T, S: RecordSink<T>> RecordSink<T> for Option<S> {
    fn append(&mut self, item: &T) -> Result<()> {
        match self {
            Some(sink) => sink.append(item),
            None => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            Some(sink) => sink.finish(),
            None => Ok(()),
        }
    }
}

impl<T, A: RecordSink<T>, B: RecordSink<T>> RecordSink<T> for (A, B) {
    fn append(&mut self, item: &T) -> Result<()> {
        self.0.append(item)?;
        self.1.append(item)
    }

    fn finish(&mut self) -> Result<()> {
        self.0.finish()?;
        self.1.finish()
    }
}

impl<T, S: RecordSink<T> + ?Sized> RecordSink<T> for &mut S {
    fn append(&mut self, item: &T) -> Result<()> {
        (**self).append(item)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    /// Lines handed to the underlying writer.
    written: u64,
    /// Byte lengths of the lines still in the buffer, oldest first.
    pending: VecDeque<usize>,
}

impl JsonLinesSink<File> {
    /// Opens `path` for appending, creating it when needed.
    pub fn append_to(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }

    /// Creates `path`, replacing any previous content.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
            pending: VecDeque::new(),
        }
    }

    /// Lines that reached the underlying writer. Lines still buffered are
    /// not counted until a flush gets them through.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> Result<W> {
        let written = self.written;
        self.writer.into_inner().map_err(|error| IngestError::Sink {
            written,
            source: error.into_error(),
        })
    }

    /// Moves lines the buffer no longer holds into the written count. The
    /// buffer always holds a tail of the output, so whole lines ahead of it
    /// are through.
    fn settle(&mut self) {
        let buffered = self.writer.buffer().len();
        let mut queued: usize = self.pending.iter().sum();
        while let Some(&oldest) = self.pending.front() {
            if queued - oldest < buffered {
                break;
            }
            queued -= oldest;
            self.pending.pop_front();
            self.written += 1;
        }
    }

    fn failed(&self, source: io::Error) -> IngestError {
        IngestError::Sink {
            written: self.written,
            source,
        }
    }
}

impl<T: Serialize, W: Write> RecordSink<T> for JsonLinesSink<W> {
    fn append(&mut self, item: &T) -> Result<()> {
        let mut line = serde_json::to_vec(item).map_err(|error| self.failed(error.into()))?;
        line.push(b'\n');
        self.pending.push_back(line.len());
        let outcome = self.writer.write_all(&line);
        if outcome.is_err() {
            // a failed write leaves nothing of this line in the buffer
            self.pending.pop_back();
        }
        self.settle();
        outcome.map_err(|error| self.failed(error))
    }

    fn finish(&mut self) -> Result<()> {
        let outcome = self.writer.flush();
        self.settle();
        outcome.map_err(|error| self.failed(error))
    }
}

/// Fact ledger kept as a JSON lines file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLinesLedger {
    path: PathBuf,
}

#[derive(Deserialize)]
struct LedgerId {
    id: u64,
}

impl JsonLinesLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the ledger for appending new facts.
    pub fn appender(&self) -> Result<JsonLinesSink<File>> {
        JsonLinesSink::append_to(&self.path)
    }
}

impl HighWaterMark for JsonLinesLedger {
    fn high_water_mark(&self) -> Result<u64> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };

        let mut highest = 0;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: LedgerId = serde_json::from_str(&line)?;
            highest = highest.max(entry.id);
        }
        Ok(highest)
    }
}
