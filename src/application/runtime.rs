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

//! # Runtime Context
//!
//! Sets up the worker pool shared by the whole run. Entities are extracted
//! in parallel on rayon's global pool, sized from the `parallel` setting or
//! from `cpu_percent` of the available cores.

use crate::config::ExtractConfig;
use log::info;

const DEFAULT_CPU_PERCENT: u8 = 50;

pub struct RuntimeContext {
    /// The number of entities extracted at once.
    pub num_threads: usize,
}

impl RuntimeContext {
    pub fn init(extract: &ExtractConfig) -> Self {
        let cpu_percent = extract.cpu_percent.unwrap_or(DEFAULT_CPU_PERCENT);
        let num_threads = worker_count(extract.parallel, cpu_percent, num_cpus::get());

        info!(
            "Initializing worker pool with {} threads (Target CPU: {}%)",
            num_threads, cpu_percent
        );

        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .unwrap_or_else(|e| {
                info!("Global thread pool already initialized: {}", e);
            });

        Self { num_threads }
    }
}

/// An explicit `parallel` wins; otherwise a share of the cores. Never zero.
fn worker_count(parallel: Option<usize>, cpu_percent: u8, total_cpus: usize) -> usize {
    let threads = parallel
        .unwrap_or_else(|| (total_cpus as f64 * (cpu_percent as f64 / 100.0)).ceil() as usize);
    threads.max(1)
}
