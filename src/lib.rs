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

//! # Bulk Extract
//!
//! Extracts entities from a job-oriented bulk API: creates one asynchronous
//! export job per entity, lets the server split large jobs into chunks,
//! polls them to completion and streams the paginated results into bounded
//! record batches, reconnecting transparently in the middle of a page.
//!
//! The crate follows the **Hexagonal Architecture** (Ports and Adapters):
//! `domain` holds the data model and query composition, `ports` the traits
//! at the system boundary, `application` the extraction logic and
//! `infrastructure` the concrete adapters.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;
