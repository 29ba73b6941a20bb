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

//! # Query Port
//!
//! The non-bulk, synchronous query API of the source. The extractor only
//! needs it for the record count behind the chunking decision and the
//! max-watermark lookup. The soft-delete fallback also goes through it to
//! fetch logically deleted rows after the bulk result is drained.

use crate::domain::entities::Record;
use crate::domain::errors::Result;

pub trait QueryPort: Send + Sync {
    /// Runs a `SELECT COUNT() ...` query and returns the total size.
    fn record_count(&self, query: &str) -> Result<u64>;

    /// Runs a watermark query and returns the raw value of `column` from the
    /// first row, or `None` when the query returned no rows.
    fn high_watermark(&self, query: &str, column: &str) -> Result<Option<String>>;

    /// Runs a regular query and returns every matching row.
    fn fetch_records(&self, query: &str) -> Result<Vec<Record>>;
}
