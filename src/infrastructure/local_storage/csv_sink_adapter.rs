// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Infrastructure adapter writing extracted records as (optionally
//! gzip-compressed) CSV files on the local filesystem.
//!
//! Each run of an entity lands in its own partition directory:
//! `<root>/<Entity>/run_id=<run>/part-00000.csv[.gz]`.

use crate::domain::entities::RecordBatch;
use crate::domain::errors::{ExtractError, Result};
use crate::ports::sink_port::{RecordSink, SinkPort, SinkSummary};
use csv::{QuoteStyle, WriterBuilder};
use flate2::write::GzEncoder;
use flate2::Compression as GzipCompression;
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

const PART_FILE: &str = "part-00000";

/// Concrete implementation of `SinkPort` for local storage.
pub struct CsvSinkAdapter {
    root: PathBuf,
    gzip: bool,
}

impl CsvSinkAdapter {
    pub fn new(root: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            root: root.into(),
            gzip,
        }
    }
}

enum Output {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Output {
    fn finish(self) -> io::Result<()> {
        match self {
            Output::Plain(mut w) => w.flush(),
            Output::Gzip(e) => e.finish()?.flush(),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Plain(w) => w.write(buf),
            Output::Gzip(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(w) => w.flush(),
            Output::Gzip(e) => e.flush(),
        }
    }
}

struct CsvRecordSink {
    dir: PathBuf,
    file: PathBuf,
    writer: csv::Writer<Output>,
    columns: Option<Vec<String>>,
    rows: u64,
}

impl RecordSink for CsvRecordSink {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        for record in &batch.records {
            if self.columns.is_none() {
                self.writer
                    .write_record(record.columns())
                    .map_err(|e| ExtractError::Sink(e.to_string()))?;
                self.columns = Some(record.columns().to_vec());
            }
            let header = self.columns.as_deref().unwrap_or_default();

            let written = if header == record.columns() {
                let fields = record.values().iter().map(|v| v.as_deref().unwrap_or(""));
                self.writer.write_record(fields)
            } else {
                // Differently shaped rows are projected onto the file header by name.
                if let Some(unknown) = record.columns().iter().find(|c| !header.contains(c)) {
                    return Err(ExtractError::Sink(format!(
                        "column {} is not part of the header of {}",
                        unknown,
                        self.file.display()
                    )));
                }
                let fields = header.iter().map(|c| record.get(c).unwrap_or(""));
                self.writer.write_record(fields)
            };
            written.map_err(|e| ExtractError::Sink(e.to_string()))?;
            self.rows += 1;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkSummary> {
        let sink = *self;
        let output = sink
            .writer
            .into_inner()
            .map_err(|e| ExtractError::Sink(e.to_string()))?;
        output.finish()?;

        let bytes = std::fs::metadata(&sink.file)?.len();
        info!("Wrote {} rows ({} bytes) to {}", sink.rows, bytes, sink.file.display());
        Ok(SinkSummary {
            location: sink.dir.display().to_string(),
            files: vec![sink.file.display().to_string()],
            rows: sink.rows,
            bytes,
            columns: sink.columns.unwrap_or_default(),
        })
    }
}

impl SinkPort for CsvSinkAdapter {
    fn open(&self, entity: &str, run_id: &str) -> Result<Box<dyn RecordSink>> {
        let dir = self.root.join(entity).join(format!("run_id={}", run_id));
        std::fs::create_dir_all(&dir)?;

        let extension = if self.gzip { "csv.gz" } else { "csv" };
        let file_path = dir.join(format!("{}.{}", PART_FILE, extension));
        let buf_writer = BufWriter::with_capacity(128 * 1024, File::create(&file_path)?);
        let output = if self.gzip {
            Output::Gzip(GzEncoder::new(buf_writer, GzipCompression::fast()))
        } else {
            Output::Plain(buf_writer)
        };

        let writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .flexible(true)
            .from_writer(output);

        Ok(Box::new(CsvRecordSink {
            dir,
            file: file_path,
            writer,
            columns: None,
            rows: 0,
        }))
    }
}
