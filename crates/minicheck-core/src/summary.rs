//! Incremental summary output.
//!
//! The summary is one JSON object mapping each input to its
//! [`TriggeredOptions`]. Runs can cover thousands of files, so entries are
//! rendered as they arrive and written out in batches instead of building the
//! whole object in memory.

use std::io::{self, Write};

use thiserror::Error;
use tracing::debug;

use crate::delta::TriggeredOptions;

/// Entries buffered before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Error writing the summary.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("failed to write summary: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize summary entry for {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Streams `{ "<id>": <result>, ... }` to a writer.
pub struct SummaryWriter<W: Write> {
    writer: W,
    batch_size: usize,
    pending: Vec<String>,
    written: usize,
    opened: bool,
}

impl<W: Write> SummaryWriter<W> {
    /// Create a writer with the default batch size.
    pub fn new(writer: W) -> Self {
        SummaryWriter::with_batch_size(writer, DEFAULT_BATCH_SIZE)
    }

    /// Create a writer that flushes every `batch_size` entries (at least one).
    pub fn with_batch_size(writer: W, batch_size: usize) -> Self {
        SummaryWriter {
            writer,
            batch_size: batch_size.max(1),
            pending: Vec::new(),
            written: 0,
            opened: false,
        }
    }

    /// Record the result for one input.
    pub fn push(&mut self, id: &str, result: &TriggeredOptions) -> Result<(), SummaryError> {
        let key = serde_json::to_string(id).map_err(|source| SummaryError::Serialize {
            id: id.to_string(),
            source,
        })?;
        let value = serde_json::to_string_pretty(result).map_err(|source| {
            SummaryError::Serialize {
                id: id.to_string(),
                source,
            }
        })?;
        self.pending
            .push(format!("  {}: {}", key, value.replace('\n', "\n  ")));
        if self.pending.len() >= self.batch_size {
            self.flush_batch()?;
        }
        Ok(())
    }

    /// Number of entries recorded so far.
    pub fn len(&self) -> usize {
        self.written + self.pending.len()
    }

    /// Whether no entries have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn open(&mut self) -> io::Result<()> {
        if !self.opened {
            self.writer.write_all(b"{\n")?;
            self.opened = true;
        }
        Ok(())
    }

    fn flush_batch(&mut self) -> io::Result<()> {
        self.open()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.written > 0 {
            self.writer.write_all(b",\n")?;
        }
        self.writer.write_all(self.pending.join(",\n").as_bytes())?;
        self.writer.flush()?;
        self.written += self.pending.len();
        debug!("summary: flushed {} entries", self.pending.len());
        self.pending.clear();
        Ok(())
    }

    /// Write any buffered entries, close the object, and return the entry count.
    pub fn finish(mut self) -> Result<usize, SummaryError> {
        self.flush_batch()?;
        if self.written == 0 {
            self.writer.write_all(b"}\n")?;
        } else {
            self.writer.write_all(b"\n}\n")?;
        }
        self.writer.flush()?;
        Ok(self.written)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Shares its buffer so tests can look at what was flushed mid-run.
    #[derive(Clone, Default)]
    struct SharedBuf(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).expect("utf8")
        }
    }

    fn linear(names: &[&str]) -> TriggeredOptions {
        TriggeredOptions::Linear(names.iter().map(|n| n.to_string()).collect())
    }

    #[test]
    fn empty_summary_is_an_empty_object() {
        let mut out = Vec::new();
        let count = SummaryWriter::new(&mut out).finish().expect("writes");
        assert_eq!(count, 0);
        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(parsed, serde_json::json!({}));
    }

    #[test]
    fn entries_round_trip_as_one_object() {
        let mut out = Vec::new();
        let mut summary = SummaryWriter::with_batch_size(&mut out, 2);
        summary.push("a.js", &linear(&["dead_code"])).expect("push");
        summary.push("b.js", &linear(&[])).expect("push");
        let sets: Vec<BTreeSet<String>> = vec![["x".to_string()].into()];
        summary
            .push("dir/\"quoted\".js", &TriggeredOptions::PowerSet(sets))
            .expect("push");
        assert_eq!(summary.finish().expect("finish"), 3);

        let parsed: serde_json::Value = serde_json::from_slice(&out).expect("valid json");
        assert_eq!(
            parsed,
            serde_json::json!({
                "a.js": ["dead_code"],
                "b.js": [],
                "dir/\"quoted\".js": [["x"]]
            })
        );
    }

    #[test]
    fn output_is_written_per_batch() {
        let buf = SharedBuf::default();
        let mut summary = SummaryWriter::with_batch_size(buf.clone(), 2);

        summary.push("a.js", &linear(&[])).expect("push");
        assert!(buf.text().is_empty(), "nothing written before a full batch");

        summary.push("b.js", &linear(&[])).expect("push");
        let after_batch = buf.text();
        assert!(after_batch.starts_with("{\n"));
        assert!(after_batch.contains("\"b.js\""));

        summary.push("c.js", &linear(&[])).expect("push");
        assert_eq!(buf.text(), after_batch, "third entry still buffered");
        assert_eq!(summary.len(), 3);

        summary.finish().expect("finish");
        assert!(buf.text().ends_with("\n}\n"));
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let buf = SharedBuf::default();
        let mut summary = SummaryWriter::with_batch_size(buf.clone(), 0);
        summary.push("a.js", &linear(&[])).expect("push");
        assert!(buf.text().contains("\"a.js\""));
    }
}
