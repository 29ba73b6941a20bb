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

//! # Record Batcher
//!
//! Groups the rows of a `ResumableStreamReader` into `RecordBatch`es of at
//! most `batch_size` records. Once the job is drained it tells the caller
//! whether soft-deleted rows still have to be fetched through the regular
//! query API.

use crate::application::stream_reader::{Fetch, ResumableStreamReader};
use crate::config::ExtractionSettings;
use crate::domain::entities::RecordBatch;
use crate::domain::errors::Result;
use log::info;

#[derive(Debug)]
pub enum Pull {
    Batch(RecordBatch),
    /// The bulk results are drained; soft-deleted rows must be queried
    /// separately. Signalled at most once.
    SoftDeleteFallback,
    Finished,
}

pub struct RecordBatcher<'a> {
    reader: ResumableStreamReader<'a>,
    batch_size: usize,
    /// Configured columns; the streamed header is used when absent.
    schema: Option<Vec<String>>,
    soft_delete_column: String,
    soft_delete_disabled: bool,
    total_rows: u64,
    fallback_signalled: bool,
}

impl<'a> RecordBatcher<'a> {
    pub fn new(
        reader: ResumableStreamReader<'a>,
        settings: &ExtractionSettings,
        schema: Option<Vec<String>>,
    ) -> Self {
        Self {
            reader,
            batch_size: settings.batch_size.max(1),
            schema,
            soft_delete_column: settings.soft_delete_column.clone(),
            soft_delete_disabled: settings.soft_delete_disabled,
            total_rows: 0,
            fallback_signalled: false,
        }
    }

    pub fn next_batch(&mut self) -> Result<Pull> {
        self.reader.reset_retry_budget();
        let mut records = Vec::new();
        while records.len() < self.batch_size {
            match self.reader.next_row()? {
                Fetch::Row(record) => records.push(record),
                Fetch::Finished => break,
            }
        }

        if !records.is_empty() {
            self.total_rows += records.len() as u64;
            info!("Total number of records processed so far: {}", self.total_rows);
            return Ok(Pull::Batch(RecordBatch {
                records,
                total_rows: self.total_rows,
            }));
        }

        if !self.fallback_signalled && !self.soft_delete_disabled && self.schema_has_soft_delete_column() {
            self.fallback_signalled = true;
            info!("Bulk results drained, retrieving soft-deleted records");
            return Ok(Pull::SoftDeleteFallback);
        }
        Ok(Pull::Finished)
    }

    fn schema_has_soft_delete_column(&self) -> bool {
        let column = self.soft_delete_column.as_str();
        match &self.schema {
            Some(columns) => columns.iter().any(|c| c.eq_ignore_ascii_case(column)),
            None => self
                .reader
                .header()
                .is_some_and(|h| h.iter().any(|c| c.eq_ignore_ascii_case(column))),
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Column names of the result, as configured or as last streamed.
    pub fn columns(&self) -> Vec<String> {
        match &self.schema {
            Some(columns) => columns.clone(),
            None => self.reader.header().map(|h| h.to_vec()).unwrap_or_default(),
        }
    }
}
