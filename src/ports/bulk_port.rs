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

//! # Bulk Job Port
//!
//! The contract for the remote, job-oriented batch API. Anything that can
//! create an asynchronous export job, report on its batches and hand back the
//! result pages as byte streams can drive the extractor: a real HTTP client,
//! a directory of staged files, or a scripted fake in tests.
//!
//! Authentication and transport concerns live entirely behind this trait.

use crate::domain::entities::{BatchInfo, JobInfo, JobRequest, ResultReference};
use crate::domain::errors::Result;
use std::io::Read;

/// A readable result page. Dropping it closes the underlying connection.
pub type ResultStream = Box<dyn Read + Send>;

/// `BulkJobPort` is shared across worker threads, hence `Send + Sync`.
pub trait BulkJobPort: Send + Sync {
    /// Creates a job for one entity. The returned job is `Open`.
    fn create_job(&self, request: &JobRequest) -> Result<JobInfo>;

    fn get_job_status(&self, job_id: &str) -> Result<JobInfo>;

    /// Submits the query text as a new batch of the job.
    fn submit_batch(&self, job_id: &str, query: &[u8]) -> Result<BatchInfo>;

    fn get_batch_status(&self, job_id: &str, batch_id: &str) -> Result<BatchInfo>;

    /// All batches of the job, in server order. For a chunked job the first
    /// entry is the original (superseded) batch.
    fn list_batches(&self, job_id: &str) -> Result<Vec<BatchInfo>>;

    fn list_result_references(&self, job_id: &str, batch_id: &str) -> Result<Vec<ResultReference>>;

    /// Opens one result page as a row-oriented text stream.
    fn open_result_stream(&self, job_id: &str, batch_id: &str, result_id: &str) -> Result<ResultStream>;

    /// Moves the job to `Closed`.
    fn close_job(&self, job_id: &str) -> Result<JobInfo>;
}
