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

//! # Domain Entities
//!
//! The "Nouns" of the extractor: bulk jobs, their batches, the result
//! references a completed batch produces, and the decoded records we hand
//! back to the caller.
//!
//! We use the `serde` crate (Serialize/Deserialize) so these structs can be
//! written into the run report and read back from the file-drop adapter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which bulk operation the job runs. `QueryAll` also returns logically
/// deleted rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Query,
    QueryAll,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Query => write!(f, "query"),
            Operation::QueryAll => write!(f, "queryAll"),
        }
    }
}

/// Batches of a bulk job are always processed in parallel by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConcurrencyMode {
    Parallel,
}

/// Result content encoding. Only row-oriented text is requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Csv,
}

/// Lifecycle of a bulk job on the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    Open,
    Closed,
    Aborted,
    Failed,
}

/// Lifecycle of a single batch inside a bulk job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchState {
    Queued,
    InProgress,
    Completed,
    Failed,
    /// Only seen on the initial batch of a chunked job, once the server has
    /// replaced it with child batches.
    NotProcessed,
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// What we ask the server to create.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub entity: String,
    pub operation: Operation,
    pub concurrency: ConcurrencyMode,
    pub content_type: ContentType,
    /// Set when the server should split the query into chunks of this many
    /// rows.
    pub chunk_size: Option<u32>,
}

/// Server view of a bulk job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub entity: String,
    pub operation: Operation,
    pub state: JobState,
}

/// Server view of one batch of a bulk job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub id: String,
    pub job_id: String,
    pub state: BatchState,
    /// Free-form explanation the server attaches to failed batches.
    pub state_message: Option<String>,
}

/// One paginated chunk of a completed batch's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReference {
    pub batch_id: String,
    pub result_id: String,
}

impl fmt::Display for ResultReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.batch_id, self.result_id)
    }
}

/// A decoded row. Column names are shared by every record of the same
/// result reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Option<String>>,
}

impl Record {
    /// Pairs raw field values with the header. Empty fields become `None`,
    /// missing trailing fields are padded and surplus fields are dropped.
    pub fn from_fields<'a, I>(columns: Arc<[String]>, fields: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values: Vec<Option<String>> = fields
            .into_iter()
            .take(columns.len())
            .map(|f| if f.is_empty() { None } else { Some(f.to_string()) })
            .collect();
        values.resize(columns.len(), None);
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Looks a value up by column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values[i].as_deref())
    }
}

/// A size-bounded group of records plus the job-wide running total.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    /// Rows delivered for the whole job so far, this batch included.
    pub total_rows: u64,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// How watermark values are formatted by the source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkType {
    #[default]
    Timestamp,
    Date,
    Hour,
    Simple,
}

/// `TaskResult` is the "Report Card" for one extracted entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub entity: String,
    pub job_id: Option<String>,
    /// Rows delivered by the bulk job.
    pub rows: u64,
    /// Rows recovered through the soft-delete fallback query.
    pub soft_deleted_rows: u64,
    pub bytes: u64,
    pub high_watermark: Option<i64>,
    /// How long it took (in seconds).
    pub duration: f64,
    /// Either "SUCCESS" or "FAILED".
    pub status: String,
    pub error: Option<String>,
}

impl TaskResult {
    /// Helper to create a successful result.
    pub fn success(
        entity: String,
        job_id: Option<String>,
        rows: u64,
        soft_deleted_rows: u64,
        bytes: u64,
        duration: f64,
    ) -> Self {
        Self {
            entity,
            job_id,
            rows,
            soft_deleted_rows,
            bytes,
            high_watermark: None,
            duration,
            status: "SUCCESS".to_string(),
            error: None,
        }
    }

    /// Helper to create a failure result.
    pub fn failure(entity: String, error: String) -> Self {
        Self {
            entity,
            job_id: None,
            rows: 0,
            soft_deleted_rows: 0,
            bytes: 0,
            high_watermark: None,
            duration: 0.0,
            status: "FAILED".to_string(),
            error: Some(error),
        }
    }

    pub fn with_high_watermark(mut self, high_watermark: Option<i64>) -> Self {
        self.high_watermark = high_watermark;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == "SUCCESS"
    }
}
