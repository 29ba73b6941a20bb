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

//! The run-level logic that extracts every configured entity.
//!
//! Each entity goes through the same pipeline: compose its query, look up
//! the high watermark, run the bulk job, stream the batches into the sink,
//! pick up soft-deleted rows when asked to, close the job and publish the
//! written data to the catalog. Entities run in parallel and a JSON report
//! summarizes the run.

use crate::application::job_orchestrator::JobOrchestrator;
use crate::application::record_batcher::{Pull, RecordBatcher};
use crate::application::registration::CatalogRegistrar;
use crate::application::stream_reader::ResumableStreamReader;
use crate::config::{AppConfig, EntityConfig, ExtractionSettings};
use crate::domain::entities::{RecordBatch, TaskResult};
use crate::domain::errors::{ExtractError, Result};
use crate::domain::query::{compose_query, count_query, parse_high_watermark, watermark_query, Predicate};
use crate::ports::bulk_port::BulkJobPort;
use crate::ports::catalog_port::{CatalogPartition, CatalogPort, CatalogTable};
use crate::ports::clock_port::Clock;
use crate::ports::query_port::QueryPort;
use crate::ports::sink_port::{SinkPort, SinkSummary};
use log::{error, info};
use rayon::prelude::*;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Returned as the high watermark when the entity has no rows.
pub const NO_WATERMARK: i64 = -1;

const RUN_PARTITION_KEY: &str = "run_id";

/// Everything the orchestrator talks to.
pub struct Ports {
    pub bulk: Arc<dyn BulkJobPort>,
    pub query: Arc<dyn QueryPort>,
    pub sink: Arc<dyn SinkPort>,
    pub catalog: Option<Arc<dyn CatalogPort>>,
    pub clock: Arc<dyn Clock>,
}

pub struct Orchestrator {
    ports: Ports,
    config: AppConfig,
    settings: ExtractionSettings,
    run_id: String,
}

impl Orchestrator {
    pub fn new(ports: Ports, config: AppConfig) -> Result<Self> {
        let settings = ExtractionSettings::from_config(&config.extract)?;
        let run_id = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        Ok(Self {
            ports,
            config,
            settings,
            run_id,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Extracts all configured entities and writes the run report.
    pub fn run(&self) -> Result<Vec<TaskResult>> {
        let start_time = Instant::now();
        info!(
            "Starting extraction run {} for {} entities",
            self.run_id,
            self.config.entities.len()
        );

        let results: Vec<TaskResult> = self
            .config
            .entities
            .par_iter()
            .map(|entity| match self.process_entity(entity) {
                Ok(res) => res,
                Err(e) => {
                    error!("Entity {} failed: {}", entity.name, e);
                    TaskResult::failure(entity.name.clone(), e.to_string())
                }
            })
            .collect();

        self.generate_report(&results, start_time.elapsed().as_secs_f64())?;

        Ok(results)
    }

    fn generate_report(&self, results: &[TaskResult], duration_secs: f64) -> Result<()> {
        let success = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - success;
        let total_rows: u64 = results.iter().map(|r| r.rows + r.soft_deleted_rows).sum();
        let total_bytes: u64 = results.iter().map(|r| r.bytes).sum();

        let report = json!({
            "summary": {
                "run_id": self.run_id,
                "operation": self.settings.operation().to_string(),
                "total_entities": results.len(),
                "success": success,
                "failed": failed,
                "total_rows": total_rows,
                "total_bytes": total_bytes,
                "total_duration_seconds": duration_secs,
            },
            "details": results
        });

        let report_path = Path::new(&self.config.output.dir).join(format!("report_{}.json", self.run_id));
        std::fs::create_dir_all(&self.config.output.dir)?;
        let file = std::fs::File::create(&report_path)?;
        serde_json::to_writer_pretty(file, &report).map_err(|e| ExtractError::Sink(e.to_string()))?;
        info!("Run report written to {}", report_path.display());

        Ok(())
    }

    fn process_entity(&self, entity: &EntityConfig) -> Result<TaskResult> {
        let start = Instant::now();
        let name = entity.name.as_str();
        info!("Processing {}", name);

        let base = entity.base_query();
        let predicates = watermark_predicates(entity)?;

        let high_watermark = match &entity.watermark_column {
            Some(column) => Some(self.high_watermark(entity, &base, column, &predicates)?),
            None => None,
        };

        let query = compose_query(&base, &predicates, None)?;
        let count = count_query(name, &base, &predicates)?;

        let jobs = JobOrchestrator::new(
            self.ports.bulk.as_ref(),
            self.ports.query.as_ref(),
            self.ports.clock.as_ref(),
            &self.settings,
        );
        let mut prepared = jobs.prepare(name, &query, &count, entity.expected_record_count)?;
        let job_id = prepared.job.id().to_string();

        let reader = ResumableStreamReader::new(
            self.ports.bulk.as_ref(),
            name,
            &job_id,
            std::mem::take(&mut prepared.references),
            self.settings.stream_retry_limit,
        );
        let mut batcher = RecordBatcher::new(reader, &self.settings, entity.columns.clone());
        let mut sink = self.ports.sink.open(name, &self.run_id)?;
        let mut soft_deleted_rows = 0u64;

        loop {
            match batcher.next_batch()? {
                Pull::Batch(batch) => sink.write_batch(&batch)?,
                Pull::SoftDeleteFallback => {
                    let deleted_query =
                        compose_query(&base, &predicates, Some(&self.settings.soft_delete_column))?;
                    info!("QUERY: {}", deleted_query);
                    let records = self.ports.query.fetch_records(&deleted_query)?;
                    soft_deleted_rows = records.len() as u64;
                    info!("Retrieved {} soft-deleted records for {}", soft_deleted_rows, name);
                    if !records.is_empty() {
                        let total_rows = batcher.total_rows() + soft_deleted_rows;
                        sink.write_batch(&RecordBatch { records, total_rows })?;
                    }
                }
                Pull::Finished => break,
            }
        }

        let rows = batcher.total_rows();
        let columns = batcher.columns();
        prepared.job.close()?;
        let summary = sink.finish()?;

        if let Some(catalog) = &self.ports.catalog {
            self.register(catalog.as_ref(), name, &summary, columns)?;
        }

        let duration = start.elapsed().as_secs_f64();
        info!(
            "Finished {}: {} rows ({} soft-deleted) in {:.2}s",
            name, rows, soft_deleted_rows, duration
        );
        Ok(TaskResult::success(
            name.to_string(),
            Some(job_id),
            rows,
            soft_deleted_rows,
            summary.bytes,
            duration,
        )
        .with_high_watermark(high_watermark))
    }

    fn high_watermark(
        &self,
        entity: &EntityConfig,
        base: &str,
        column: &str,
        predicates: &[String],
    ) -> Result<i64> {
        let query = watermark_query(&entity.name, base, column, predicates)?;
        info!("MAX WATERMARK QUERY: {}", query);
        match self.ports.query.high_watermark(&query, column)? {
            Some(value) => parse_high_watermark(&value, entity.watermark_type.unwrap_or_default()),
            None => Ok(NO_WATERMARK),
        }
    }

    fn register(
        &self,
        catalog: &dyn CatalogPort,
        entity: &str,
        summary: &SinkSummary,
        columns: Vec<String>,
    ) -> Result<()> {
        let database = match &self.config.catalog {
            Some(c) => c.database.clone(),
            None => return Ok(()),
        };
        let columns = if summary.columns.is_empty() { columns } else { summary.columns.clone() };
        let location = Path::new(&summary.location)
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| summary.location.clone());

        let table = CatalogTable {
            database,
            name: entity.to_ascii_lowercase(),
            location,
            columns,
            partition_keys: vec![RUN_PARTITION_KEY.to_string()],
        };
        let partition = CatalogPartition {
            values: vec![self.run_id.clone()],
            location: summary.location.clone(),
        };

        let registrar = CatalogRegistrar::new(catalog);
        registrar.register_table(&table)?;
        registrar.register_partition(&table, &partition)?;
        Ok(())
    }
}

/// Configured predicates plus the lower watermark bound, if any.
fn watermark_predicates(entity: &EntityConfig) -> Result<Vec<String>> {
    let mut predicates = entity.predicates.clone().unwrap_or_default();
    if let (Some(column), Some(low)) = (&entity.watermark_column, entity.low_watermark) {
        let kind = entity.watermark_type.unwrap_or_default();
        predicates.push(Predicate::new(column, low, ">=", kind).condition()?);
    }
    Ok(predicates)
}
