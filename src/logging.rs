// src/logging.rs
//
// Telemetry sinks for the dialogue environment.
// - TurnSink: trait used by the environment loop
// - NoopSink: discards all turns
// - FileSink: writes one JSON line per turn for offline analysis

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::reward::Outcome;
use crate::types::Frame;

/// One logged turn: the finalized agent frame, the (possibly corrupted)
/// user response, and the step result.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord<'a> {
    pub episode: u64,
    pub round: u32,
    pub agent_frame: &'a Frame,
    pub user_frame: &'a Frame,
    pub reward: f64,
    pub done: bool,
    pub outcome: Outcome,
}

/// Abstract sink for per-turn telemetry.
pub trait TurnSink {
    fn log_turn(&mut self, record: &TurnRecord<'_>);
}

/// Sink that discards all turns.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TurnSink for NoopSink {
    fn log_turn(&mut self, _record: &TurnRecord<'_>) {
        // intentionally no-op
    }
}

/// JSONL file sink.
///
/// Each turn is written as a single JSON object on its own line.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new sink writing to `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl TurnSink for FileSink {
    fn log_turn(&mut self, record: &TurnRecord<'_>) {
        // If logging fails we don't want to abort the episode,
        // so we deliberately ignore I/O errors.
        if let Ok(line) = serde_json::to_string(record) {
            let _ = self.writer.write_all(line.as_bytes());
            let _ = self.writer.write_all(b"\n");
            let _ = self.writer.flush();
        }
    }
}
