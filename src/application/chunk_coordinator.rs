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

//! # Chunk Coordinator
//!
//! When the server splits a job into chunks, the original batch turns
//! `NotProcessed` and a set of child batches appears next to it. This module
//! waits for those children and then enumerates the result references of
//! every completed batch, in order.

use crate::domain::entities::{BatchInfo, BatchState, ResultReference};
use crate::domain::errors::{ExtractError, Result};
use crate::ports::bulk_port::BulkJobPort;
use crate::ports::clock_port::Clock;
use log::{debug, info};
use std::time::Duration;

/// Polls one batch until it is `Completed` or `Failed`.
pub fn poll_until_terminal(
    bulk: &dyn BulkJobPort,
    clock: &dyn Clock,
    job_id: &str,
    batch_id: &str,
    interval: Duration,
) -> Result<BatchInfo> {
    let mut batch = bulk.get_batch_status(job_id, batch_id)?;
    while !batch.state.is_terminal() {
        clock.sleep(interval);
        batch = bulk.get_batch_status(job_id, batch_id)?;
        debug!("Bulk batch info: {:?}", batch);
        info!("Waiting for batch {} of job {}", batch_id, job_id);
    }
    Ok(batch)
}

/// Waits for the child batches of a chunked job.
///
/// The first entry of `batches` is the superseded original batch and is not
/// polled. Waiting stops at the first failed child. Returns the refreshed
/// children examined so far; the last one is `Failed` if a child failed.
pub fn wait_for_chunk_batches(
    bulk: &dyn BulkJobPort,
    clock: &dyn Clock,
    job_id: &str,
    batches: &[BatchInfo],
    interval: Duration,
) -> Result<Vec<BatchInfo>> {
    let mut examined = Vec::with_capacity(batches.len().saturating_sub(1));

    for child in batches.iter().skip(1) {
        let refreshed = poll_until_terminal(bulk, clock, job_id, &child.id, interval)?;
        let failed = refreshed.state == BatchState::Failed;
        examined.push(refreshed);
        if failed {
            break;
        }
    }

    Ok(examined)
}

pub fn job_failure(entity: &str, batch: &BatchInfo) -> ExtractError {
    ExtractError::JobFailure {
        entity: entity.to_string(),
        job_id: batch.job_id.clone(),
        batch_id: batch.id.clone(),
        message: batch
            .state_message
            .clone()
            .unwrap_or_else(|| "no message from server".to_string()),
    }
}

/// Fails with `JobFailure` when the batch is `Failed`.
pub fn ensure_not_failed(entity: &str, batch: &BatchInfo) -> Result<()> {
    if batch.state == BatchState::Failed {
        return Err(job_failure(entity, batch));
    }
    Ok(())
}

/// Lists the result references of every completed batch, preserving batch
/// order and then the server's order within each batch.
pub fn collect_result_references(
    bulk: &dyn BulkJobPort,
    job_id: &str,
    batches: &[BatchInfo],
) -> Result<Vec<ResultReference>> {
    let mut references = Vec::new();
    for batch in batches.iter().filter(|b| b.state == BatchState::Completed) {
        references.extend(bulk.list_result_references(job_id, &batch.id)?);
    }
    info!("Query result references: {:?}", references);
    Ok(references)
}
