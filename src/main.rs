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

//! Command-line entry point: loads the configuration, wires the adapters and
//! extracts every configured entity.

use bulk_extract::application::orchestrator::{Orchestrator, Ports};
use bulk_extract::application::runtime::RuntimeContext;
use bulk_extract::config::{AppConfig, CliArgs};
use bulk_extract::infrastructure::catalog::json_catalog_adapter::JsonCatalogAdapter;
use bulk_extract::infrastructure::file_drop::file_drop_adapter::FileDropAdapter;
use bulk_extract::infrastructure::local_storage::csv_sink_adapter::CsvSinkAdapter;
use bulk_extract::infrastructure::system_clock::SystemClock;
use bulk_extract::ports::catalog_port::CatalogPort;
use clap::Parser;
use log::{error, info};
use std::process;
use std::sync::Arc;

fn main() {
    // 1. Initialize Logging
    env_logger::init();

    // 2. Parse Arguments
    let args = CliArgs::parse();

    // 3. Load Config
    let mut config = match AppConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            process::exit(1);
        }
    };

    // Merge CLI overrides
    config.merge_cli(&args);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    // 4. Setup Parallelism
    RuntimeContext::init(&config.extract);

    // 5. Initialize Hexagonal Components
    let source = Arc::new(FileDropAdapter::new(&config.source.root));
    let sink = Arc::new(CsvSinkAdapter::new(
        &config.output.dir,
        config.output.gzip.unwrap_or(true),
    ));
    let catalog: Option<Arc<dyn CatalogPort>> = match &config.catalog {
        Some(c) => match JsonCatalogAdapter::open(&c.path) {
            Ok(adapter) => Some(Arc::new(adapter)),
            Err(e) => {
                error!("Failed to open catalog {}: {}", c.path, e);
                process::exit(1);
            }
        },
        None => None,
    };

    let ports = Ports {
        bulk: source.clone(),
        query: source,
        sink,
        catalog,
        clock: Arc::new(SystemClock),
    };

    // 6. Run Orchestrator
    let orchestrator = match Orchestrator::new(ports, config) {
        Ok(o) => o,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    info!("Starting extraction run {}...", orchestrator.run_id());
    match orchestrator.run() {
        Ok(results) => {
            let success_count = results.iter().filter(|r| r.is_success()).count();
            info!(
                "Extraction finished. {}/{} entities successful.",
                success_count,
                results.len()
            );
            if success_count < results.len() {
                process::exit(2);
            }
        }
        Err(e) => {
            error!("Orchestrator failed: {}", e);
            process::exit(1);
        }
    }
}
