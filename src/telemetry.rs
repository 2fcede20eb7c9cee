//! Structured telemetry: row schema and the thread-safe CSV sink.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use parking_lot::Mutex;

/// Schema v1 column header for the telemetry stream.
pub const TELEMETRY_HEADER: &str = "minute,module,task_id,phase_index,active,calibrating,\
cooldown_remaining,elapsed,required,energy_used,battery_level_wh,power_available_w,\
interrupted,defective,orbit,action,reward";

/// One telemetry record: a (tick, module, job) action event.
///
/// `reward` is reserved for the external scheduler; the simulator always
/// emits 0.0.
#[derive(Debug, Clone)]
pub struct TelemetryRow<'a> {
    pub minute: u64,
    pub module: &'static str,
    pub task_id: &'a str,
    pub phase_index: usize,
    pub active: bool,
    pub calibrating: bool,
    pub cooldown_remaining: u32,
    pub elapsed: u32,
    pub required: u32,
    pub energy_used: u64,
    pub battery_level_wh: u64,
    pub power_available_w: u32,
    pub interrupted: bool,
    pub defective: bool,
    pub orbit: &'static str,
    pub action: &'static str,
}

struct Inner {
    // None once the sink has been shut down or has failed.
    sink: Option<csv::Writer<Box<dyn Write + Send>>>,
    rows_written: u64,
    failed: bool,
}

/// Append-only telemetry sink shared by all module workers.
///
/// All appends are serialized by an internal lock. A write failure is
/// reported once on stderr and suppresses the rest of the stream; the
/// simulation itself keeps running.
pub struct TelemetryWriter {
    inner: Mutex<Inner>,
}

impl TelemetryWriter {
    /// Opens a CSV sink at `path` and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the file cannot be created or the header
    /// cannot be written.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Self::from_writer(Box::new(BufWriter::new(file)))
    }

    /// Wraps any writer (used by tests) and writes the header row.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the header cannot be written.
    pub fn from_writer(writer: Box<dyn Write + Send>) -> io::Result<Self> {
        let mut sink = csv::WriterBuilder::new().from_writer(writer);
        sink.write_record(TELEMETRY_HEADER.split(','))
            .map_err(io::Error::other)?;
        sink.flush()?;
        Ok(Self {
            inner: Mutex::new(Inner {
                sink: Some(sink),
                rows_written: 0,
                failed: false,
            }),
        })
    }

    /// Appends one row. Serialized; safe to call from any worker. Each
    /// row is flushed through so a sink failure surfaces at the row that
    /// hit it.
    pub fn write_row(&self, row: &TelemetryRow<'_>) {
        let mut inner = self.inner.lock();
        let Some(sink) = inner.sink.as_mut() else {
            return;
        };
        let written = sink.write_record(&[
            row.minute.to_string(),
            row.module.to_string(),
            row.task_id.to_string(),
            row.phase_index.to_string(),
            row.active.to_string(),
            row.calibrating.to_string(),
            row.cooldown_remaining.to_string(),
            row.elapsed.to_string(),
            row.required.to_string(),
            row.energy_used.to_string(),
            row.battery_level_wh.to_string(),
            row.power_available_w.to_string(),
            row.interrupted.to_string(),
            row.defective.to_string(),
            row.orbit.to_string(),
            row.action.to_string(),
            "0.0".to_string(),
        ]);
        let result = written
            .map_err(io::Error::other)
            .and_then(|()| sink.flush());
        match result {
            Ok(()) => inner.rows_written += 1,
            Err(e) => {
                eprintln!("telemetry: write failed ({e}); suppressing further telemetry");
                inner.sink = None;
                inner.failed = true;
            }
        }
    }

    /// Rows appended so far (header excluded).
    pub fn rows_written(&self) -> u64 {
        self.inner.lock().rows_written
    }

    /// Whether the sink was shut down by a write failure.
    pub fn sink_failed(&self) -> bool {
        self.inner.lock().failed
    }

    /// Flushes buffered rows to the underlying writer. Mandatory at
    /// shutdown.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the flush fails.
    pub fn flush(&self) -> io::Result<()> {
        match self.inner.lock().sink.as_mut() {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}
