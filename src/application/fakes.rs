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

//! In-memory stand-ins for the ports, shared by the application tests.

use crate::domain::entities::{
    BatchInfo, BatchState, JobInfo, JobRequest, JobState, Record, RecordBatch, ResultReference,
};
use crate::domain::errors::{ExtractError, Result};
use crate::ports::bulk_port::{BulkJobPort, ResultStream};
use crate::ports::catalog_port::{CatalogPartition, CatalogPort, CatalogTable};
use crate::ports::clock_port::Clock;
use crate::ports::query_port::QueryPort;
use crate::ports::sink_port::{RecordSink, SinkPort, SinkSummary};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const JOB_ID: &str = "750000000000001";

/// What one `open_result_stream` call returns.
#[derive(Clone)]
pub struct Page {
    pub body: String,
    /// Fail with an I/O error once this many bytes were served.
    pub fail_after: Option<usize>,
    pub error_kind: io::ErrorKind,
}

impl Page {
    pub fn ok(body: &str) -> Self {
        Self { body: body.to_string(), fail_after: None, error_kind: io::ErrorKind::ConnectionReset }
    }

    pub fn failing(body: &str, fail_after: usize) -> Self {
        Self { fail_after: Some(fail_after), ..Self::ok(body) }
    }

    pub fn failing_with(body: &str, fail_after: usize, error_kind: io::ErrorKind) -> Self {
        Self { error_kind, ..Self::failing(body, fail_after) }
    }
}

struct FlakyReader {
    data: Vec<u8>,
    pos: usize,
    fail_after: Option<usize>,
    error_kind: io::ErrorKind,
}

impl Read for FlakyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = self.fail_after.unwrap_or(self.data.len()).min(self.data.len());
        if self.pos >= limit {
            if self.fail_after.is_some() {
                return Err(io::Error::new(self.error_kind, "connection dropped"));
            }
            return Ok(0);
        }
        let n = buf.len().min(limit - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[derive(Default)]
struct Script {
    job_state: Option<JobState>,
    requests: Vec<JobRequest>,
    submitted: Vec<String>,
    primary_batch: String,
    /// Successive states per batch id; the last one repeats.
    states: HashMap<String, VecDeque<BatchState>>,
    batch_order: Vec<String>,
    results: HashMap<String, Vec<String>>,
    /// Successive pages per (batch, result); the last one repeats.
    pages: HashMap<(String, String), VecDeque<Page>>,
    opened: Vec<ResultReference>,
    close_calls: usize,
    status_polls: usize,
}

/// Scripted bulk service.
pub struct ScriptedBulk {
    script: Mutex<Script>,
}

impl ScriptedBulk {
    pub fn new(primary_batch: &str) -> Self {
        let script = Script {
            primary_batch: primary_batch.to_string(),
            batch_order: vec![primary_batch.to_string()],
            ..Default::default()
        };
        Self { script: Mutex::new(script) }
    }

    pub fn batch_states(self, batch: &str, states: &[BatchState]) -> Self {
        {
            let mut s = self.script.lock().unwrap();
            s.states.insert(batch.to_string(), states.iter().copied().collect());
            if !s.batch_order.iter().any(|b| b == batch) {
                s.batch_order.push(batch.to_string());
            }
        }
        self
    }

    pub fn results(self, batch: &str, result_ids: &[&str]) -> Self {
        self.script
            .lock()
            .unwrap()
            .results
            .insert(batch.to_string(), result_ids.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn pages(self, batch: &str, result: &str, pages: Vec<Page>) -> Self {
        self.script
            .lock()
            .unwrap()
            .pages
            .insert((batch.to_string(), result.to_string()), pages.into_iter().collect());
        self
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.script.lock().unwrap().submitted.clone()
    }

    pub fn opened(&self) -> Vec<ResultReference> {
        self.script.lock().unwrap().opened.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.script.lock().unwrap().close_calls
    }

    pub fn status_polls(&self) -> usize {
        self.script.lock().unwrap().status_polls
    }

    fn batch(&self, s: &mut Script, batch_id: &str, advance: bool) -> BatchInfo {
        let queue = s.states.entry(batch_id.to_string()).or_default();
        let state = if advance && queue.len() > 1 {
            queue.pop_front().unwrap_or(BatchState::Completed)
        } else {
            queue.front().copied().unwrap_or(BatchState::Completed)
        };
        BatchInfo {
            id: batch_id.to_string(),
            job_id: JOB_ID.to_string(),
            state,
            state_message: (state == BatchState::Failed).then(|| "InvalidBatch".to_string()),
        }
    }
}

impl BulkJobPort for ScriptedBulk {
    fn create_job(&self, request: &JobRequest) -> Result<JobInfo> {
        let mut s = self.script.lock().unwrap();
        s.requests.push(request.clone());
        s.job_state = Some(JobState::Open);
        Ok(JobInfo {
            id: JOB_ID.to_string(),
            entity: request.entity.clone(),
            operation: request.operation,
            state: JobState::Open,
        })
    }

    fn get_job_status(&self, job_id: &str) -> Result<JobInfo> {
        let s = self.script.lock().unwrap();
        let request = s.requests.last().ok_or_else(|| ExtractError::Remote("no job".into()))?;
        Ok(JobInfo {
            id: job_id.to_string(),
            entity: request.entity.clone(),
            operation: request.operation,
            state: s.job_state.unwrap_or(JobState::Open),
        })
    }

    fn submit_batch(&self, _job_id: &str, query: &[u8]) -> Result<BatchInfo> {
        let mut s = self.script.lock().unwrap();
        s.submitted.push(String::from_utf8_lossy(query).into_owned());
        let primary = s.primary_batch.clone();
        Ok(BatchInfo {
            id: primary,
            job_id: JOB_ID.to_string(),
            state: BatchState::Queued,
            state_message: None,
        })
    }

    fn get_batch_status(&self, _job_id: &str, batch_id: &str) -> Result<BatchInfo> {
        let mut s = self.script.lock().unwrap();
        s.status_polls += 1;
        Ok(self.batch(&mut s, batch_id, true))
    }

    fn list_batches(&self, _job_id: &str) -> Result<Vec<BatchInfo>> {
        let mut s = self.script.lock().unwrap();
        let order = s.batch_order.clone();
        Ok(order.iter().map(|b| self.batch(&mut s, b, false)).collect())
    }

    fn list_result_references(&self, _job_id: &str, batch_id: &str) -> Result<Vec<ResultReference>> {
        let s = self.script.lock().unwrap();
        Ok(s.results
            .get(batch_id)
            .map(|ids| {
                ids.iter()
                    .map(|r| ResultReference { batch_id: batch_id.to_string(), result_id: r.clone() })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn open_result_stream(&self, _job_id: &str, batch_id: &str, result_id: &str) -> Result<ResultStream> {
        let mut s = self.script.lock().unwrap();
        s.opened.push(ResultReference { batch_id: batch_id.to_string(), result_id: result_id.to_string() });
        let queue = s
            .pages
            .get_mut(&(batch_id.to_string(), result_id.to_string()))
            .ok_or_else(|| ExtractError::Remote(format!("unknown result {}/{}", batch_id, result_id)))?;
        let page = if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Page::ok(""))
        } else {
            queue.front().cloned().unwrap_or_else(|| Page::ok(""))
        };
        Ok(Box::new(FlakyReader {
            data: page.body.into_bytes(),
            pos: 0,
            fail_after: page.fail_after,
            error_kind: page.error_kind,
        }))
    }

    fn close_job(&self, job_id: &str) -> Result<JobInfo> {
        let mut s = self.script.lock().unwrap();
        s.close_calls += 1;
        s.job_state = Some(JobState::Closed);
        let request = s.requests.last().ok_or_else(|| ExtractError::Remote("no job".into()))?;
        Ok(JobInfo {
            id: job_id.to_string(),
            entity: request.entity.clone(),
            operation: request.operation,
            state: JobState::Closed,
        })
    }
}

/// Records sleeps instead of performing them.
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Query API with canned answers.
#[derive(Default)]
pub struct CannedQuery {
    pub count: u64,
    pub watermark: Option<String>,
    pub fallback_rows: Vec<Record>,
    pub queries: Mutex<Vec<String>>,
}

impl CannedQuery {
    pub fn with_count(count: u64) -> Self {
        Self { count, ..Default::default() }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl QueryPort for CannedQuery {
    fn record_count(&self, query: &str) -> Result<u64> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.count)
    }

    fn high_watermark(&self, query: &str, _column: &str) -> Result<Option<String>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.watermark.clone())
    }

    fn fetch_records(&self, query: &str) -> Result<Vec<Record>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.fallback_rows.clone())
    }
}

/// Keeps written rows in memory, keyed by entity.
#[derive(Default, Clone)]
pub struct MemorySink {
    written: Arc<Mutex<HashMap<String, Vec<Record>>>>,
}

impl MemorySink {
    pub fn rows(&self, entity: &str) -> Vec<Record> {
        self.written.lock().unwrap().get(entity).cloned().unwrap_or_default()
    }
}

struct MemoryRecordSink {
    entity: String,
    run_id: String,
    rows: Vec<Record>,
    written: Arc<Mutex<HashMap<String, Vec<Record>>>>,
}

impl RecordSink for MemoryRecordSink {
    fn write_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        self.rows.extend(batch.records.iter().cloned());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<SinkSummary> {
        let columns = self.rows.first().map(|r| r.columns().to_vec()).unwrap_or_default();
        let summary = SinkSummary {
            location: format!("/mem/{}/run_id={}", self.entity, self.run_id),
            files: vec!["part-00000".to_string()],
            rows: self.rows.len() as u64,
            bytes: self.rows.len() as u64 * 10,
            columns,
        };
        self.written.lock().unwrap().insert(self.entity, self.rows);
        Ok(summary)
    }
}

impl SinkPort for MemorySink {
    fn open(&self, entity: &str, run_id: &str) -> Result<Box<dyn RecordSink>> {
        Ok(Box::new(MemoryRecordSink {
            entity: entity.to_string(),
            run_id: run_id.to_string(),
            rows: Vec::new(),
            written: self.written.clone(),
        }))
    }
}

/// Catalog kept in maps, recording every mutating call.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: Mutex<HashMap<String, CatalogTable>>,
    partitions: Mutex<HashMap<(String, Vec<String>), CatalogPartition>>,
    calls: Mutex<Vec<&'static str>>,
}

impl MemoryCatalog {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn table(&self, name: &str) -> Option<CatalogTable> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    fn put_partition(&self, table: &str, partition: &CatalogPartition) {
        self.partitions
            .lock()
            .unwrap()
            .insert((table.to_string(), partition.values.clone()), partition.clone());
    }
}

impl CatalogPort for MemoryCatalog {
    fn get_table(&self, _database: &str, table: &str) -> Result<Option<CatalogTable>> {
        Ok(self.tables.lock().unwrap().get(table).cloned())
    }

    fn create_table(&self, table: &CatalogTable) -> Result<()> {
        self.calls.lock().unwrap().push("create_table");
        self.tables.lock().unwrap().insert(table.name.clone(), table.clone());
        Ok(())
    }

    fn alter_table(&self, table: &CatalogTable) -> Result<()> {
        self.calls.lock().unwrap().push("alter_table");
        self.tables.lock().unwrap().insert(table.name.clone(), table.clone());
        Ok(())
    }

    fn get_partition(&self, _database: &str, table: &str, values: &[String]) -> Result<Option<CatalogPartition>> {
        Ok(self
            .partitions
            .lock()
            .unwrap()
            .get(&(table.to_string(), values.to_vec()))
            .cloned())
    }

    fn add_partition(&self, _database: &str, table: &str, partition: &CatalogPartition) -> Result<()> {
        self.calls.lock().unwrap().push("add_partition");
        self.put_partition(table, partition);
        Ok(())
    }

    fn alter_partition(&self, _database: &str, table: &str, partition: &CatalogPartition) -> Result<()> {
        self.calls.lock().unwrap().push("alter_partition");
        self.put_partition(table, partition);
        Ok(())
    }
}

/// Builds a CSV page with `rows` data rows after the header.
pub fn csv_page(header: &str, prefix: &str, rows: usize) -> String {
    let mut body = format!("{}\n", header);
    for i in 0..rows {
        body.push_str(&format!("{}{},\"row {}\"\n", prefix, i, i));
    }
    body
}
