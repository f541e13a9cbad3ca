//! # Telemetry Sink
//!
//! Writes sensor records to the output stream in the configured format.

use crate::config::OutputFormat;
use crate::error::Result;
use crate::tagged::encoder::write_tagged;
use crate::tagged::protocol::{SensorTagData, SensorValue};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};

/// One JSON line
#[derive(Debug, Serialize)]
struct JsonRecord<'a> {
    timestamp: String,
    sensor: &'a str,
    tag: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u8>,
    unit: &'static str,
    value: &'a SensorValue,
}

/// Record writer over any byte stream
pub struct TelemetrySink<W: Write> {
    writer: W,
    format: OutputFormat,
    records: u64,
}

impl<W: Write> TelemetrySink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            records: 0,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Records written so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Write one record produced by `sensor`
    ///
    /// # Errors
    ///
    /// Returns error if the stream rejects the write
    pub fn write(&mut self, sensor: &str, data: &SensorTagData) -> Result<()> {
        match self.format {
            OutputFormat::Binary => {
                write_tagged(&mut self.writer, data)?;
            }
            OutputFormat::Text => {
                writeln!(self.writer, "{}", data)?;
            }
            OutputFormat::Jsonl => {
                let info = data.tag.info();
                let record = JsonRecord {
                    timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                    sensor,
                    tag: info.name,
                    id: info.has_id.then_some(data.id),
                    unit: info.unit,
                    value: &data.value,
                };
                serde_json::to_writer(&mut self.writer, &record)?;
                self.writer.write_all(b"\n")?;
            }
        }
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Open the configured output: `-` for stdout, otherwise a file (truncated)
pub fn open_output(path: &str) -> Result<Box<dyn Write + Send>> {
    if path == "-" {
        return Ok(Box::new(io::stdout()));
    }
    Ok(Box::new(BufWriter::new(File::create(path)?)))
}
