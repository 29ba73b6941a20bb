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

//! # Configuration
//!
//! `AppConfig` is loaded from YAML or JSON (picked by file extension) and can
//! be overridden from the command line. The engine itself never reads
//! `AppConfig` directly: it works from `ExtractionSettings`, the validated and
//! clamped view built by `ExtractionSettings::from_config`.

use crate::domain::entities::{Operation, WatermarkType};
use crate::domain::errors::{ExtractError, Result};
use clap::Parser;
use log::warn;
use serde::Deserialize;
use std::fs;

pub const MIN_CHUNK_SIZE: u32 = 100_000;
pub const MAX_CHUNK_SIZE: u32 = 250_000;
pub const DEFAULT_CHUNK_SIZE: u32 = 200_000;

/// Chunking multiplies the number of bulk API calls, so it is only allowed
/// when the caller plans at most this many partitions.
pub const CHUNKING_MAX_PARTITIONS_LIMIT: u32 = 3;
pub const DEFAULT_MAX_PARTITIONS: u32 = 20;

pub const DEFAULT_FETCH_SIZE: usize = 1000;
pub const DEFAULT_STREAM_RETRY_LIMIT: u32 = 5;
pub const DEFAULT_SOFT_DELETE_COLUMN: &str = "IsDeleted";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    pub output: OutputConfig,
    pub catalog: Option<CatalogConfig>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Root directory of the staged result sets served by the file-drop adapter.
    pub root: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtractConfig {
    #[serde(default)]
    pub chunking_enabled: bool,
    pub chunk_size: Option<i64>,
    #[serde(default)]
    pub skip_count_check: bool,
    /// Records per batch handed to the caller. `0` means the default.
    pub fetch_size: Option<usize>,
    pub stream_retry_limit: Option<u32>,
    #[serde(default)]
    pub use_query_all: bool,
    #[serde(default)]
    pub soft_delete_retrieval_disabled: bool,
    pub soft_delete_column: Option<String>,
    pub max_partitions: Option<u32>,
    #[serde(default)]
    pub user_specified_partitions: bool,
    pub parallel: Option<usize>,
    pub cpu_percent: Option<u8>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: String,
    pub gzip: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    /// JSON file backing the local catalog.
    pub path: String,
    pub database: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EntityConfig {
    pub name: String,
    /// Full base query. Defaults to `SELECT <columns> FROM <name>`.
    pub query: Option<String>,
    pub columns: Option<Vec<String>>,
    pub predicates: Option<Vec<String>>,
    pub watermark_column: Option<String>,
    pub watermark_type: Option<WatermarkType>,
    /// Lower bound (inclusive) in the internal watermark encoding.
    pub low_watermark: Option<i64>,
    /// Known size of the result; saves the count query when present.
    pub expected_record_count: Option<u64>,
}

impl EntityConfig {
    pub fn base_query(&self) -> String {
        if let Some(q) = &self.query {
            return q.clone();
        }
        let cols = match &self.columns {
            Some(cols) if !cols.is_empty() => cols.join(", "),
            _ => "Id".to_string(),
        };
        format!("SELECT {} FROM {}", cols, self.name)
    }
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long)]
    pub config: String,

    // Overrides for ad-hoc runs
    #[arg(long)]
    pub source_root: Option<String>,
    #[arg(short, long)]
    pub output: Option<String>,
    /// Only extract these entities (repeatable)
    #[arg(long = "entity")]
    pub entities: Vec<String>,
    #[arg(long)]
    pub enable_chunking: bool,
    #[arg(long)]
    pub chunk_size: Option<i64>,
    #[arg(long)]
    pub skip_count_check: bool,
    #[arg(long)]
    pub parallel: Option<usize>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;

        let config: AppConfig = if path.ends_with(".json") {
            serde_json::from_str(&contents).map_err(|e| ExtractError::ConfigError(e.to_string()))?
        } else {
            serde_yaml::from_str(&contents).map_err(|e| ExtractError::ConfigError(e.to_string()))?
        };

        Ok(config)
    }

    pub fn merge_cli(&mut self, args: &CliArgs) {
        if let Some(r) = &args.source_root { self.source.root = r.clone(); }
        if let Some(o) = &args.output { self.output.dir = o.clone(); }
        if args.enable_chunking { self.extract.chunking_enabled = true; }
        if let Some(c) = args.chunk_size { self.extract.chunk_size = Some(c); }
        if args.skip_count_check { self.extract.skip_count_check = true; }
        if let Some(p) = args.parallel { self.extract.parallel = Some(p); }
        if !args.entities.is_empty() {
            self.entities.retain(|e| args.entities.iter().any(|n| n.eq_ignore_ascii_case(&e.name)));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.root.trim().is_empty() {
            return Err(ExtractError::ConfigError("source.root must be set".into()));
        }
        if self.output.dir.trim().is_empty() {
            return Err(ExtractError::ConfigError("output.dir must be set".into()));
        }
        if self.entities.is_empty() {
            return Err(ExtractError::ConfigError("no entities configured".into()));
        }
        for entity in &self.entities {
            if entity.name.trim().is_empty() {
                return Err(ExtractError::ConfigError("entity name must not be empty".into()));
            }
            if entity.low_watermark.is_some() && entity.watermark_column.is_none() {
                return Err(ExtractError::ConfigError(format!(
                    "{}: low_watermark requires watermark_column",
                    entity.name
                )));
            }
        }
        if let Some(p) = self.extract.cpu_percent {
            if p == 0 || p > 100 {
                return Err(ExtractError::ConfigError(format!("cpu_percent out of range: {}", p)));
            }
        }
        ExtractionSettings::from_config(&self.extract).map(|_| ())
    }
}

/// Validated engine settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSettings {
    /// Final chunking eligibility, after the partition checks.
    pub chunking_enabled: bool,
    pub chunk_size: u32,
    pub skip_count_check: bool,
    pub batch_size: usize,
    pub stream_retry_limit: u32,
    pub use_query_all: bool,
    pub soft_delete_disabled: bool,
    pub soft_delete_column: String,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            chunking_enabled: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            skip_count_check: false,
            batch_size: DEFAULT_FETCH_SIZE,
            stream_retry_limit: DEFAULT_STREAM_RETRY_LIMIT,
            use_query_all: false,
            soft_delete_disabled: false,
            soft_delete_column: DEFAULT_SOFT_DELETE_COLUMN.to_string(),
        }
    }
}

impl ExtractionSettings {
    pub fn from_config(cfg: &ExtractConfig) -> Result<Self> {
        let max_partitions = cfg.max_partitions.unwrap_or(DEFAULT_MAX_PARTITIONS);
        let chunking_enabled =
            chunking_eligible(cfg.chunking_enabled, cfg.user_specified_partitions, max_partitions);

        let soft_delete_column = cfg
            .soft_delete_column
            .clone()
            .unwrap_or_else(|| DEFAULT_SOFT_DELETE_COLUMN.to_string());
        if soft_delete_column.trim().is_empty() {
            return Err(ExtractError::ConfigError("soft_delete_column must not be empty".into()));
        }

        let batch_size = match cfg.fetch_size {
            None | Some(0) => DEFAULT_FETCH_SIZE,
            Some(n) => n,
        };

        Ok(Self {
            chunking_enabled,
            chunk_size: clamp_chunk_size(cfg.chunk_size),
            skip_count_check: cfg.skip_count_check,
            batch_size,
            stream_retry_limit: cfg.stream_retry_limit.unwrap_or(DEFAULT_STREAM_RETRY_LIMIT),
            use_query_all: cfg.use_query_all,
            soft_delete_disabled: cfg.soft_delete_retrieval_disabled,
            soft_delete_column,
        })
    }

    pub fn operation(&self) -> Operation {
        if self.use_query_all {
            Operation::QueryAll
        } else {
            Operation::Query
        }
    }

    /// `queryAll` only exists on newer API versions.
    pub fn api_version(&self) -> &'static str {
        if self.use_query_all {
            "42.0"
        } else {
            "29.0"
        }
    }
}

/// Chunking is never used with caller-defined partitions or when the caller
/// may fan out to more than `CHUNKING_MAX_PARTITIONS_LIMIT` partitions.
pub fn chunking_eligible(requested: bool, user_specified_partitions: bool, max_partitions: u32) -> bool {
    if user_specified_partitions || max_partitions > CHUNKING_MAX_PARTITIONS_LIMIT {
        if requested {
            warn!("Max partitions too high, so chunking is not enabled");
        }
        return false;
    }
    requested
}

pub fn clamp_chunk_size(requested: Option<i64>) -> u32 {
    let size = requested.unwrap_or(DEFAULT_CHUNK_SIZE as i64);
    let clamped = size.clamp(MIN_CHUNK_SIZE as i64, MAX_CHUNK_SIZE as i64) as u32;
    if clamped as i64 != size {
        warn!("Chunk size {} clamped to {}", size, clamped);
    }
    clamped
}
