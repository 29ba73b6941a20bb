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

//! Core error definitions for the bulk extractor.
//!
//! This module provides a centralized `ExtractError` enum and a `Result` type
//! used throughout the application. Only `TransientStream` is ever retried,
//! and only by the stream reader; everything else is fatal for the entity.

use thiserror::Error;

/// Error types encountered during an extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A batch reached the `Failed` state on the server.
    #[error("Bulk job {job_id} failed for {entity} (batch {batch_id}): {message}")]
    JobFailure {
        entity: String,
        job_id: String,
        batch_id: String,
        message: String,
    },

    /// I/O failure while reading an open result reference, after the
    /// reconnect budget has been spent.
    #[error(
        "Stream for {entity} (job {job_id}, batch {batch_id}, result {result_id}) failed after {attempts} reconnects: {source}"
    )]
    TransientStream {
        entity: String,
        job_id: String,
        batch_id: String,
        result_id: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// Replay after a reconnect did not land on the last delivered row.
    #[error(
        "Repositioning after reconnecting did not point to the expected record for {entity} (job {job_id}, batch {batch_id}, result {result_id}, skipped {skipped})"
    )]
    RepositionMismatch {
        entity: String,
        job_id: String,
        batch_id: String,
        result_id: String,
        skipped: u64,
    },

    /// The reader was used again after a fatal error.
    #[error("Result stream for {entity} (job {job_id}) already failed: {reason}")]
    StreamAborted {
        entity: String,
        job_id: String,
        reason: String,
    },

    #[error("Remote call failed: {0}")]
    Remote(String),

    #[error("Invalid query: {0}")]
    Query(String),

    #[error("Failed to decode result row: {0}")]
    Decode(String),

    #[error("Output sink error: {0}")]
    Sink(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized Result type for the bulk extractor.
pub type Result<T> = std::result::Result<T, ExtractError>;
