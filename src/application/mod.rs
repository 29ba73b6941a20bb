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

//! Use cases: driving bulk jobs, reading their results and running a full
//! extraction.

pub mod chunk_coordinator;
pub mod job_orchestrator;
pub mod orchestrator;
pub mod record_batcher;
pub mod registration;
pub mod runtime;
pub mod stream_reader;

#[cfg(test)]
mod fakes;
