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

//! Infrastructure adapter serving staged result sets from a local directory.
//!
//! Layout under the root:
//!
//! ```text
//! <root>/<Entity>/*.csv[.gz]          bulk result pages, one reference each
//! <root>/<Entity>/deleted/*.csv[.gz]  rows returned by the soft-delete query
//! ```
//!
//! Query text is recorded and logged but not evaluated: every job for an
//! entity serves all of its staged pages. A job created with a chunk size is
//! split the way the server does it: the submitted batch turns
//! `NotProcessed` and each page becomes its own child batch.

use crate::domain::entities::{
    BatchInfo, BatchState, JobInfo, JobRequest, JobState, Record, ResultReference,
};
use crate::domain::errors::{ExtractError, Result};
use crate::ports::bulk_port::{BulkJobPort, ResultStream};
use crate::ports::query_port::QueryPort;
use flate2::read::GzDecoder;
use log::{debug, info};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

const DELETED_DIR: &str = "deleted";

struct StagedBatch {
    info: BatchInfo,
    /// Result id and backing file, in serving order.
    results: Vec<(String, PathBuf)>,
}

struct StagedJob {
    info: JobInfo,
    chunk_size: Option<u32>,
    batches: Vec<StagedBatch>,
}

/// Concrete implementation of `BulkJobPort` and `QueryPort` over a file drop.
pub struct FileDropAdapter {
    root: PathBuf,
    jobs: Mutex<HashMap<String, StagedJob>>,
    next_id: AtomicU64,
}

impl FileDropAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn jobs(&self) -> Result<MutexGuard<'_, HashMap<String, StagedJob>>> {
        self.jobs
            .lock()
            .map_err(|_| ExtractError::Remote("job registry lock poisoned".into()))
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}{:012}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn entity_dir(&self, entity: &str) -> Result<PathBuf> {
        let dir = self.root.join(entity);
        if !dir.is_dir() {
            return Err(ExtractError::Remote(format!(
                "no staged data for entity {} under {}",
                entity,
                self.root.display()
            )));
        }
        Ok(dir)
    }

    fn with_job<T>(&self, job_id: &str, f: impl FnOnce(&mut StagedJob) -> Result<T>) -> Result<T> {
        let mut jobs = self.jobs()?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| ExtractError::Remote(format!("unknown job {}", job_id)))?;
        f(job)
    }
}

/// Staged pages in `dir`, sorted by file name.
fn staged_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let stem = name
            .strip_suffix(".csv.gz")
            .or_else(|| name.strip_suffix(".csv"))
            .map(str::to_string);
        if let Some(stem) = stem {
            files.push((stem, path));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn open_file(path: &Path) -> Result<ResultStream> {
    let file = File::open(path)?;
    let gzipped = path.extension().is_some_and(|e| e == "gz");
    if gzipped {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn csv_error(path: &Path, e: csv::Error) -> ExtractError {
    ExtractError::Decode(format!("{}: {}", path.display(), e))
}

/// Entity named after the first ` from ` of the query.
fn entity_from_query(query: &str) -> Result<String> {
    let lower = query.to_ascii_lowercase();
    let idx = lower
        .find(" from ")
        .ok_or_else(|| ExtractError::Query(format!("query does not contain 'from': {}", query)))?;
    query[idx + " from ".len()..]
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ExtractError::Query(format!("query has no entity: {}", query)))
}

impl BulkJobPort for FileDropAdapter {
    fn create_job(&self, request: &JobRequest) -> Result<JobInfo> {
        self.entity_dir(&request.entity)?;
        let info = JobInfo {
            id: self.next_id("750"),
            entity: request.entity.clone(),
            operation: request.operation,
            state: JobState::Open,
        };
        info!("Created staged {} job {} for {}", info.operation, info.id, info.entity);
        self.jobs()?.insert(
            info.id.clone(),
            StagedJob {
                info: info.clone(),
                chunk_size: request.chunk_size,
                batches: Vec::new(),
            },
        );
        Ok(info)
    }

    fn get_job_status(&self, job_id: &str) -> Result<JobInfo> {
        self.with_job(job_id, |job| Ok(job.info.clone()))
    }

    fn submit_batch(&self, job_id: &str, query: &[u8]) -> Result<BatchInfo> {
        debug!("Staged batch query for job {}: {}", job_id, String::from_utf8_lossy(query));
        let entity = self.get_job_status(job_id)?.entity;
        let files = staged_files(&self.entity_dir(&entity)?)?;
        let primary_id = self.next_id("751");

        let mut batches = Vec::new();
        let batch = |id: String, state: BatchState, results| StagedBatch {
            info: BatchInfo {
                id,
                job_id: job_id.to_string(),
                state,
                state_message: None,
            },
            results,
        };

        let chunked = self.with_job(job_id, |job| Ok(job.chunk_size.is_some()))?;
        if chunked {
            batches.push(batch(primary_id, BatchState::NotProcessed, Vec::new()));
            for file in files {
                batches.push(batch(self.next_id("751"), BatchState::Completed, vec![file]));
            }
        } else {
            batches.push(batch(primary_id, BatchState::Completed, files));
        }

        self.with_job(job_id, |job| {
            if job.info.state != JobState::Open {
                return Err(ExtractError::Remote(format!("job {} is not open", job_id)));
            }
            let primary = batches[0].info.clone();
            job.batches.extend(batches);
            Ok(primary)
        })
    }

    fn get_batch_status(&self, job_id: &str, batch_id: &str) -> Result<BatchInfo> {
        self.with_job(job_id, |job| {
            job.batches
                .iter()
                .find(|b| b.info.id == batch_id)
                .map(|b| b.info.clone())
                .ok_or_else(|| ExtractError::Remote(format!("unknown batch {} in job {}", batch_id, job_id)))
        })
    }

    fn list_batches(&self, job_id: &str) -> Result<Vec<BatchInfo>> {
        self.with_job(job_id, |job| Ok(job.batches.iter().map(|b| b.info.clone()).collect()))
    }

    fn list_result_references(&self, job_id: &str, batch_id: &str) -> Result<Vec<ResultReference>> {
        self.with_job(job_id, |job| {
            let batch = job
                .batches
                .iter()
                .find(|b| b.info.id == batch_id)
                .ok_or_else(|| ExtractError::Remote(format!("unknown batch {} in job {}", batch_id, job_id)))?;
            Ok(batch
                .results
                .iter()
                .map(|(id, _)| ResultReference {
                    batch_id: batch_id.to_string(),
                    result_id: id.clone(),
                })
                .collect())
        })
    }

    fn open_result_stream(&self, job_id: &str, batch_id: &str, result_id: &str) -> Result<ResultStream> {
        let path = self.with_job(job_id, |job| {
            job.batches
                .iter()
                .filter(|b| b.info.id == batch_id)
                .flat_map(|b| b.results.iter())
                .find(|(id, _)| id == result_id)
                .map(|(_, path)| path.clone())
                .ok_or_else(|| {
                    ExtractError::Remote(format!("unknown result {}/{} in job {}", batch_id, result_id, job_id))
                })
        })?;
        open_file(&path)
    }

    fn close_job(&self, job_id: &str) -> Result<JobInfo> {
        self.with_job(job_id, |job| {
            job.info.state = JobState::Closed;
            Ok(job.info.clone())
        })
    }
}

impl QueryPort for FileDropAdapter {
    fn record_count(&self, query: &str) -> Result<u64> {
        let entity = entity_from_query(query)?;
        let mut count = 0u64;
        for (_, path) in staged_files(&self.entity_dir(&entity)?)? {
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(open_file(&path)?);
            for row in reader.records() {
                row.map_err(|e| csv_error(&path, e))?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn high_watermark(&self, query: &str, column: &str) -> Result<Option<String>> {
        let entity = entity_from_query(query)?;
        let mut max: Option<String> = None;
        for (_, path) in staged_files(&self.entity_dir(&entity)?)? {
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(open_file(&path)?);
            let position = reader
                .headers()
                .map_err(|e| csv_error(&path, e))?
                .iter()
                .position(|h| h == column);
            let Some(position) = position else { continue };

            for row in reader.records() {
                let row = row.map_err(|e| csv_error(&path, e))?;
                if let Some(value) = row.get(position).filter(|v| !v.is_empty()) {
                    if max.as_deref().map_or(true, |m| value > m) {
                        max = Some(value.to_string());
                    }
                }
            }
        }
        Ok(max)
    }

    fn fetch_records(&self, query: &str) -> Result<Vec<Record>> {
        let entity = entity_from_query(query)?;
        let dir = self.entity_dir(&entity)?.join(DELETED_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for (_, path) in staged_files(&dir)? {
            let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(open_file(&path)?);
            let header: Arc<[String]> = reader
                .headers()
                .map_err(|e| csv_error(&path, e))?
                .iter()
                .map(String::from)
                .collect();
            for row in reader.records() {
                let row = row.map_err(|e| csv_error(&path, e))?;
                records.push(Record::from_fields(header.clone(), row.iter()));
            }
        }
        Ok(records)
    }
}
