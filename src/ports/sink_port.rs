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

//! # Sink Port
//!
//! Where extracted records go. The extractor does not care about the storage
//! format; it opens one `RecordSink` per entity, feeds it batches in order
//! and closes it once the entity is complete.

use crate::domain::entities::RecordBatch;
use crate::domain::errors::Result;

/// Describes what a sink produced, for catalog registration and reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkSummary {
    /// Directory holding the written files.
    pub location: String,
    pub files: Vec<String>,
    pub rows: u64,
    pub bytes: u64,
    /// Column order of the written data.
    pub columns: Vec<String>,
}

/// An open writer for one entity.
pub trait RecordSink: Send {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()>;

    /// Flushes and closes the output.
    fn finish(self: Box<Self>) -> Result<SinkSummary>;
}

/// Factory for per-entity sinks. Each run writes into its own `run_id`
/// partition of the entity.
pub trait SinkPort: Send + Sync {
    fn open(&self, entity: &str, run_id: &str) -> Result<Box<dyn RecordSink>>;
}
