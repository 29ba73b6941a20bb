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

//! # Job Orchestrator
//!
//! Drives one bulk job from creation to the point where its result
//! references are known:
//! 1. **Chunking decision**: configured eligibility plus an optional
//!    record-count query.
//! 2. **Create & submit**: one job, one batch carrying the query.
//! 3. **Wait**: an explicit phase machine polls the primary batch and, for
//!    chunked jobs, hands over to the chunk coordinator.
//!
//! The job itself is wrapped in a `BulkJob` guard which closes it on the
//! server exactly once, either explicitly or when dropped.

use crate::application::chunk_coordinator::{
    collect_result_references, ensure_not_failed, job_failure, wait_for_chunk_batches,
};
use crate::config::ExtractionSettings;
use crate::domain::entities::{
    BatchInfo, BatchState, ConcurrencyMode, ContentType, JobInfo, JobRequest, JobState, ResultReference,
};
use crate::domain::errors::{ExtractError, Result};
use crate::ports::bulk_port::BulkJobPort;
use crate::ports::clock_port::Clock;
use crate::ports::query_port::QueryPort;
use log::{debug, info, warn};
use std::time::Duration;

const MAX_POLL_INTERVAL_SECS: u64 = 600;
const BASE_POLL_INTERVAL_SECS: u64 = 30;

/// `min(600s, 30s + ceil(rows / 10000) * 2s)`.
pub fn poll_interval(expected_rows_per_batch: u64) -> Duration {
    let secs = BASE_POLL_INTERVAL_SECS + expected_rows_per_batch.div_ceil(10_000) * 2;
    Duration::from_secs(secs.min(MAX_POLL_INTERVAL_SECS))
}

/// An open job on the server. Closed at most once.
pub struct BulkJob<'a> {
    bulk: &'a dyn BulkJobPort,
    info: JobInfo,
    closed: bool,
}

impl<'a> BulkJob<'a> {
    fn new(bulk: &'a dyn BulkJobPort, info: JobInfo) -> Self {
        Self { bulk, info, closed: false }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Closes the job unless the server already reports it `Closed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let status = self.bulk.get_job_status(&self.info.id)?;
        if status.state != JobState::Closed {
            info!("Closing bulk job {}", self.info.id);
            self.info = self.bulk.close_job(&self.info.id)?;
        } else {
            self.info = status;
        }
        self.closed = true;
        Ok(())
    }
}

impl Drop for BulkJob<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close bulk job {}: {}", self.info.id, e);
        }
    }
}

/// A job whose batches are all done, ready for streaming.
pub struct PreparedJob<'a> {
    pub job: BulkJob<'a>,
    pub references: Vec<ResultReference>,
    pub chunked: bool,
    pub poll_interval: Duration,
}

/// Where the expected record count comes from. Queried at most once.
struct ExpectedCount<'q> {
    query: &'q dyn QueryPort,
    count_query: &'q str,
    value: Option<u64>,
}

impl ExpectedCount<'_> {
    fn get(&mut self) -> Result<u64> {
        if let Some(v) = self.value {
            return Ok(v);
        }
        info!("COUNT QUERY: {}", self.count_query);
        let v = self.query.record_count(self.count_query)?;
        self.value = Some(v);
        Ok(v)
    }
}

/// States of a submitted job, from the client's point of view.
enum JobPhase {
    AwaitingPrimary(BatchInfo),
    AwaitingChunks,
    Done(Vec<BatchInfo>),
}

pub struct JobOrchestrator<'a> {
    bulk: &'a dyn BulkJobPort,
    query: &'a dyn QueryPort,
    clock: &'a dyn Clock,
    settings: &'a ExtractionSettings,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(
        bulk: &'a dyn BulkJobPort,
        query: &'a dyn QueryPort,
        clock: &'a dyn Clock,
        settings: &'a ExtractionSettings,
    ) -> Self {
        Self { bulk, query, clock, settings }
    }

    /// Creates and runs the job for `entity`, returning once every batch is
    /// complete and the result references are enumerated.
    ///
    /// `expected_record_count` short-circuits the count query when the caller
    /// already knows the size.
    pub fn prepare(
        &self,
        entity: &str,
        query: &str,
        count_query: &str,
        expected_record_count: Option<u64>,
    ) -> Result<PreparedJob<'a>> {
        let mut expected = ExpectedCount {
            query: self.query,
            count_query,
            value: expected_record_count,
        };

        let chunked = self.use_chunking(&mut expected)?;
        if chunked {
            info!("Enabling chunking with size {} for {}", self.settings.chunk_size, entity);
        }

        let request = JobRequest {
            entity: entity.to_string(),
            operation: self.settings.operation(),
            concurrency: ConcurrencyMode::Parallel,
            content_type: ContentType::Csv,
            chunk_size: chunked.then_some(self.settings.chunk_size),
        };
        info!(
            "Creating bulk {} job for {} (api version {})",
            request.operation,
            entity,
            self.settings.api_version()
        );
        let created = self.bulk.create_job(&request)?;
        let mut job = BulkJob::new(self.bulk, created);
        job.info = self.bulk.get_job_status(job.id())?;

        info!("QUERY: {}", query);
        let submitted = self.bulk.submit_batch(job.id(), query.as_bytes())?;

        let rows_per_batch = if chunked {
            self.settings.chunk_size as u64
        } else {
            expected.get()?
        };
        let interval = poll_interval(rows_per_batch);
        info!("Bulk api poll interval in seconds: {}", interval.as_secs());

        let primary = self.bulk.get_batch_status(job.id(), &submitted.id)?;
        let batches = self.drive(entity, job.id(), primary, chunked, interval)?;
        let references = collect_result_references(self.bulk, job.id(), &batches)?;
        info!("Number of bulk api result references for {}: {}", entity, references.len());

        Ok(PreparedJob {
            job,
            references,
            chunked,
            poll_interval: interval,
        })
    }

    /// Chunking needs eligibility, then either the skip flag or a count above
    /// the chunk size.
    fn use_chunking(&self, expected: &mut ExpectedCount<'_>) -> Result<bool> {
        if !self.settings.chunking_enabled {
            return Ok(false);
        }
        if self.settings.skip_count_check {
            return Ok(true);
        }
        Ok(expected.get()? > self.settings.chunk_size as u64)
    }

    /// Runs the phase machine to completion and returns the batches whose
    /// results should be read.
    fn drive(
        &self,
        entity: &str,
        job_id: &str,
        primary: BatchInfo,
        chunked: bool,
        interval: Duration,
    ) -> Result<Vec<BatchInfo>> {
        let mut phase = JobPhase::AwaitingPrimary(primary);
        loop {
            phase = match phase {
                JobPhase::AwaitingPrimary(batch) => match batch.state {
                    BatchState::Completed => JobPhase::Done(vec![batch]),
                    BatchState::Failed => {
                        warn!("Bulk batch failed: {:?}", batch);
                        return Err(job_failure(entity, &batch));
                    }
                    BatchState::NotProcessed if chunked => JobPhase::AwaitingChunks,
                    _ => {
                        self.clock.sleep(interval);
                        let refreshed = self.bulk.get_batch_status(job_id, &batch.id)?;
                        debug!("Bulk batch info: {:?}", refreshed);
                        info!("Waiting for bulk result references");
                        JobPhase::AwaitingPrimary(refreshed)
                    }
                },
                JobPhase::AwaitingChunks => {
                    let batches = self.bulk.list_batches(job_id)?;
                    let children = wait_for_chunk_batches(self.bulk, self.clock, job_id, &batches, interval)?;
                    match children.last() {
                        Some(last) => ensure_not_failed(entity, last)?,
                        None => {
                            return Err(ExtractError::JobFailure {
                                entity: entity.to_string(),
                                job_id: job_id.to_string(),
                                batch_id: batches.first().map(|b| b.id.clone()).unwrap_or_default(),
                                message: "chunked job produced no child batches".to_string(),
                            })
                        }
                    }
                    JobPhase::Done(children)
                }
                JobPhase::Done(batches) => return Ok(batches),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fakes::{CannedQuery, RecordingClock, ScriptedBulk, JOB_ID};
    use crate::domain::entities::Operation;

    fn settings(chunking: bool) -> ExtractionSettings {
        ExtractionSettings {
            chunking_enabled: chunking,
            ..Default::default()
        }
    }

    #[test]
    fn test_poll_interval() {
        assert_eq!(poll_interval(200_000), Duration::from_secs(70));
        assert_eq!(poll_interval(250_000), Duration::from_secs(80));
        assert_eq!(poll_interval(0), Duration::from_secs(30));
        assert_eq!(poll_interval(1), Duration::from_secs(32));
        assert_eq!(poll_interval(50_000), Duration::from_secs(40));
        assert_eq!(poll_interval(10_000_000), Duration::from_secs(600));

        let mut last = Duration::ZERO;
        for rows in (0..5_000_000u64).step_by(37_000) {
            let i = poll_interval(rows);
            assert!(i >= last);
            assert!(i <= Duration::from_secs(600));
            last = i;
        }
    }

    #[test]
    fn test_chunking_activates_only_above_chunk_size() {
        for (count, expect) in [(199_999u64, false), (200_000, false), (200_001, true), (300_000, true)] {
            // b0 completes directly; only the decision matters here
            let bulk = ScriptedBulk::new("b0").batch_states("b0", &[BatchState::Completed]);
            let query = CannedQuery::with_count(count);
            let clock = RecordingClock::default();
            let s = settings(true);
            let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);

            let prepared = orch.prepare("Account", "SELECT Id FROM Account", "SELECT COUNT() FROM Account", None);
            let prepared = prepared.unwrap();
            assert_eq!(prepared.chunked, expect, "count {}", count);
            assert_eq!(bulk.requests()[0].chunk_size.is_some(), expect);
            // the count query runs once even though it feeds two decisions
            assert_eq!(query.queries().len(), 1);
        }
    }

    #[test]
    fn test_skip_count_check_avoids_count_query() {
        let bulk = ScriptedBulk::new("b0")
            .batch_states("b0", &[BatchState::NotProcessed])
            .batch_states("b1", &[BatchState::Completed]);
        let query = CannedQuery::with_count(10);
        let clock = RecordingClock::default();
        let s = ExtractionSettings {
            chunking_enabled: true,
            skip_count_check: true,
            ..Default::default()
        };
        let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);

        let prepared = orch.prepare("Account", "SELECT Id FROM Account", "unused", None).unwrap();
        assert!(prepared.chunked);
        assert!(query.queries().is_empty());
        assert_eq!(prepared.poll_interval, Duration::from_secs(70));
    }

    #[test]
    fn test_unchunked_job_polls_until_completed() {
        let bulk = ScriptedBulk::new("b0")
            .batch_states("b0", &[BatchState::Queued, BatchState::InProgress, BatchState::Completed])
            .results("b0", &["r0", "r1"]);
        let query = CannedQuery::with_count(50_000);
        let clock = RecordingClock::default();
        let s = settings(false);
        let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);

        let prepared = orch
            .prepare("Account", "SELECT Id FROM Account", "SELECT COUNT() FROM Account", None)
            .unwrap();

        assert!(!prepared.chunked);
        assert_eq!(prepared.references.len(), 2);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(40); 2]);
        assert_eq!(bulk.status_polls(), 3);

        let request = &bulk.requests()[0];
        assert_eq!(request.operation, Operation::Query);
        assert_eq!(request.concurrency, ConcurrencyMode::Parallel);
        assert_eq!(request.content_type, ContentType::Csv);
        assert_eq!(bulk.submitted(), vec!["SELECT Id FROM Account".to_string()]);
    }

    #[test]
    fn test_not_processed_is_not_terminal_without_chunking() {
        // Without chunking NotProcessed keeps polling until a terminal state.
        let bulk = ScriptedBulk::new("b0")
            .batch_states("b0", &[BatchState::NotProcessed, BatchState::Completed])
            .results("b0", &["r0"]);
        let query = CannedQuery::default();
        let clock = RecordingClock::default();
        let s = settings(false);
        let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);

        let prepared = orch.prepare("Account", "SELECT Id FROM Account", "c", Some(5)).unwrap();
        assert_eq!(prepared.references.len(), 1);
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[test]
    fn test_failed_primary_batch_is_fatal_and_job_is_closed() {
        let bulk = ScriptedBulk::new("b0").batch_states("b0", &[BatchState::InProgress, BatchState::Failed]);
        let query = CannedQuery::default();
        let clock = RecordingClock::default();
        let s = settings(false);
        let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);

        let err = orch.prepare("Account", "SELECT Id FROM Account", "c", Some(10)).err().unwrap();
        match err {
            ExtractError::JobFailure { entity, job_id, batch_id, message } => {
                assert_eq!(entity, "Account");
                assert_eq!(job_id, JOB_ID);
                assert_eq!(batch_id, "b0");
                assert_eq!(message, "InvalidBatch");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(bulk.close_calls(), 1);
    }

    #[test]
    fn test_failed_chunk_fails_job() {
        let bulk = ScriptedBulk::new("b0")
            .batch_states("b0", &[BatchState::NotProcessed])
            .batch_states("b1", &[BatchState::Completed])
            .batch_states("b2", &[BatchState::Failed])
            .batch_states("b3", &[BatchState::Completed]);
        let query = CannedQuery::default();
        let clock = RecordingClock::default();
        let s = ExtractionSettings {
            chunking_enabled: true,
            skip_count_check: true,
            ..Default::default()
        };
        let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);

        let err = orch.prepare("Account", "SELECT Id FROM Account", "c", None).err().unwrap();
        assert!(matches!(err, ExtractError::JobFailure { ref batch_id, .. } if batch_id == "b2"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let bulk = ScriptedBulk::new("b0").results("b0", &[]);
        let query = CannedQuery::default();
        let clock = RecordingClock::default();
        let s = settings(false);
        let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);

        let mut prepared = orch.prepare("Account", "SELECT Id FROM Account", "c", Some(1)).unwrap();
        prepared.job.close().unwrap();
        prepared.job.close().unwrap();
        drop(prepared);
        assert_eq!(bulk.close_calls(), 1);
    }

    #[test]
    fn test_query_all_operation() {
        let bulk = ScriptedBulk::new("b0");
        let query = CannedQuery::default();
        let clock = RecordingClock::default();
        let s = ExtractionSettings {
            use_query_all: true,
            ..Default::default()
        };
        let orch = JobOrchestrator::new(&bulk, &query, &clock, &s);
        let _prepared = orch.prepare("Account", "SELECT Id FROM Account", "c", Some(1)).unwrap();
        assert_eq!(bulk.requests()[0].operation, Operation::QueryAll);
    }
}
