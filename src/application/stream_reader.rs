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

//! # Resumable Stream Reader
//!
//! Streams the result references of a finished job one after the other and
//! decodes their CSV rows into `Record`s.
//!
//! Each reference is read through a `StreamCursor`. When the connection
//! breaks in the middle of a reference, the cursor reopens it, replays the
//! header plus every row already handed out, and checks that the last
//! replayed row is the one delivered before the failure. Anything else is a
//! `RepositionMismatch`.
//!
//! Reconnects are budgeted per reference and the budget is renewed at the
//! start of every fetch cycle. After a fatal error the reader stays failed.

use crate::domain::entities::{Record, ResultReference};
use crate::domain::errors::{ExtractError, Result};
use crate::ports::bulk_port::{BulkJobPort, ResultStream};
use csv::StringRecord;
use log::{debug, info, warn};
use std::io;
use std::sync::Arc;

/// Outcome of one fetch.
#[derive(Debug)]
pub enum Fetch {
    Row(Record),
    /// Every reference is exhausted.
    Finished,
}

fn csv_reader(stream: ResultStream) -> csv::Reader<ResultStream> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(stream)
}

fn into_io_error(e: csv::Error) -> io::Error {
    match e.into_kind() {
        csv::ErrorKind::Io(err) => err,
        other => io::Error::new(io::ErrorKind::Other, format!("{:?}", other)),
    }
}

enum Replay {
    Ready,
    Interrupted(io::Error),
}

/// Read position inside one result reference.
struct StreamCursor {
    reference: ResultReference,
    reader: Option<csv::Reader<ResultStream>>,
    header: Option<Arc<[String]>>,
    rows_delivered: u64,
    last_row: Option<StringRecord>,
    reconnects: u32,
}

impl StreamCursor {
    fn open(ctx: &ResumableStreamReader<'_>, reference: ResultReference) -> Result<Self> {
        debug!("Opening result {} of job {}", reference, ctx.job_id);
        let stream = ctx
            .bulk
            .open_result_stream(&ctx.job_id, &reference.batch_id, &reference.result_id)?;
        Ok(Self {
            reference,
            reader: Some(csv_reader(stream)),
            header: None,
            rows_delivered: 0,
            last_row: None,
            reconnects: 0,
        })
    }

    /// Next record of this reference, or `None` once it is exhausted.
    fn next_record(&mut self, ctx: &ResumableStreamReader<'_>) -> Result<Option<Record>> {
        loop {
            match self.read_record() {
                Ok(record) => return Ok(record),
                Err(e) if e.is_io_error() => self.recover(ctx, into_io_error(e))?,
                Err(e) => {
                    return Err(ExtractError::Decode(format!(
                        "{}: result {} of job {}: {}",
                        ctx.entity, self.reference, ctx.job_id, e
                    )))
                }
            }
        }
    }

    fn read_record(&mut self) -> std::result::Result<Option<Record>, csv::Error> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Ok(None),
        };

        let header = match &self.header {
            Some(header) => header.clone(),
            None => {
                let mut line = StringRecord::new();
                if !reader.read_record(&mut line)? {
                    return Ok(None);
                }
                let header: Arc<[String]> = line.iter().map(String::from).collect();
                self.header = Some(header.clone());
                header
            }
        };

        let mut row = StringRecord::new();
        if !reader.read_record(&mut row)? {
            return Ok(None);
        }
        self.rows_delivered += 1;
        let record = Record::from_fields(header, row.iter());
        self.last_row = Some(row);
        Ok(Some(record))
    }

    /// Reopens the reference until the replay succeeds or the retry limit is
    /// spent. `error` is the failure that started the recovery and is the one
    /// escalated.
    fn recover(&mut self, ctx: &ResumableStreamReader<'_>, error: io::Error) -> Result<()> {
        loop {
            self.reader = None;
            if self.reconnects >= ctx.retry_limit {
                return Err(ExtractError::TransientStream {
                    entity: ctx.entity.clone(),
                    job_id: ctx.job_id.clone(),
                    batch_id: self.reference.batch_id.clone(),
                    result_id: self.reference.result_id.clone(),
                    attempts: self.reconnects,
                    source: error,
                });
            }
            self.reconnects += 1;
            warn!(
                "Stream of result {} interrupted after {} rows ({}), reconnect attempt {}/{}",
                self.reference, self.rows_delivered, error, self.reconnects, ctx.retry_limit
            );

            match self.replay(ctx)? {
                Replay::Ready => return Ok(()),
                Replay::Interrupted(e) => {
                    warn!("Replay of result {} interrupted: {}", self.reference, e);
                }
            }
        }
    }

    /// Opens the reference again and skips the header plus every delivered row.
    fn replay(&mut self, ctx: &ResumableStreamReader<'_>) -> Result<Replay> {
        let stream = ctx.bulk.open_result_stream(
            &ctx.job_id,
            &self.reference.batch_id,
            &self.reference.result_id,
        )?;
        let mut reader = csv_reader(stream);

        if self.rows_delivered == 0 {
            self.header = None;
            self.reader = Some(reader);
            return Ok(Replay::Ready);
        }

        let mut line = StringRecord::new();
        let mut skipped = 0u64;
        for position in 0..=self.rows_delivered {
            match reader.read_record(&mut line) {
                Ok(true) if position > 0 => skipped += 1,
                Ok(true) => {}
                Ok(false) => return Err(self.mismatch(ctx, skipped)),
                Err(e) if e.is_io_error() => return Ok(Replay::Interrupted(into_io_error(e))),
                Err(e) => return Err(ExtractError::Decode(e.to_string())),
            }
        }

        let same_row = self
            .last_row
            .as_ref()
            .is_some_and(|last| last.iter().eq(line.iter()));
        if !same_row {
            return Err(self.mismatch(ctx, skipped));
        }

        info!("Resumed result {} after skipping {} rows", self.reference, skipped);
        self.reader = Some(reader);
        Ok(Replay::Ready)
    }

    fn mismatch(&self, ctx: &ResumableStreamReader<'_>, skipped: u64) -> ExtractError {
        ExtractError::RepositionMismatch {
            entity: ctx.entity.clone(),
            job_id: ctx.job_id.clone(),
            batch_id: self.reference.batch_id.clone(),
            result_id: self.reference.result_id.clone(),
            skipped,
        }
    }
}

/// Reads the references of one job strictly in order, one open stream at a
/// time.
pub struct ResumableStreamReader<'a> {
    bulk: &'a dyn BulkJobPort,
    entity: String,
    job_id: String,
    references: Vec<ResultReference>,
    next_reference: usize,
    cursor: Option<StreamCursor>,
    retry_limit: u32,
    last_header: Option<Arc<[String]>>,
    rows_read: u64,
    /// Set once a fatal error was returned; the reader stays failed.
    failure: Option<String>,
}

impl<'a> ResumableStreamReader<'a> {
    pub fn new(
        bulk: &'a dyn BulkJobPort,
        entity: &str,
        job_id: &str,
        references: Vec<ResultReference>,
        retry_limit: u32,
    ) -> Self {
        Self {
            bulk,
            entity: entity.to_string(),
            job_id: job_id.to_string(),
            references,
            next_reference: 0,
            cursor: None,
            retry_limit,
            last_header: None,
            rows_read: 0,
            failure: None,
        }
    }

    /// Gives the open reference a fresh reconnect budget. Called at the start
    /// of every fetch cycle.
    pub fn reset_retry_budget(&mut self) {
        if let Some(cursor) = self.cursor.as_mut() {
            cursor.reconnects = 0;
        }
    }

    pub fn next_row(&mut self) -> Result<Fetch> {
        if let Some(reason) = &self.failure {
            return Err(ExtractError::StreamAborted {
                entity: self.entity.clone(),
                job_id: self.job_id.clone(),
                reason: reason.clone(),
            });
        }
        let fetched = self.fetch();
        if let Err(e) = &fetched {
            self.failure = Some(e.to_string());
        }
        fetched
    }

    fn fetch(&mut self) -> Result<Fetch> {
        loop {
            let mut cursor = match self.cursor.take() {
                Some(cursor) => cursor,
                None => {
                    let reference = match self.references.get(self.next_reference) {
                        Some(r) => r.clone(),
                        None => return Ok(Fetch::Finished),
                    };
                    self.next_reference += 1;
                    StreamCursor::open(self, reference)?
                }
            };

            let record = cursor.next_record(self)?;
            if cursor.header.is_some() {
                self.last_header = cursor.header.clone();
            }

            match record {
                Some(record) => {
                    self.rows_read += 1;
                    self.cursor = Some(cursor);
                    return Ok(Fetch::Row(record));
                }
                None => {
                    info!(
                        "Finished result {} of job {}: {} rows",
                        cursor.reference, self.job_id, cursor.rows_delivered
                    );
                }
            }
        }
    }

    /// Header of the most recently opened non-empty reference.
    pub fn header(&self) -> Option<&[String]> {
        self.last_header.as_deref()
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }
}
