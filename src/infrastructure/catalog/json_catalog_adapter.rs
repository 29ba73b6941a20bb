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

//! A table catalog persisted as a single JSON document.
//!
//! The whole catalog is kept in memory and rewritten after every change.
//! Creating something that exists, or altering something that does not, is
//! reported as a `Catalog` error.

use crate::domain::errors::{ExtractError, Result};
use crate::ports::catalog_port::{CatalogPartition, CatalogPort, CatalogTable};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTable {
    table: CatalogTable,
    #[serde(default)]
    partitions: Vec<CatalogPartition>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    tables: Vec<StoredTable>,
}

impl CatalogDocument {
    fn find(&self, database: &str, table: &str) -> Option<&StoredTable> {
        self.tables
            .iter()
            .find(|t| t.table.database == database && t.table.name == table)
    }

    fn find_mut(&mut self, database: &str, table: &str) -> Result<&mut StoredTable> {
        self.tables
            .iter_mut()
            .find(|t| t.table.database == database && t.table.name == table)
            .ok_or_else(|| ExtractError::Catalog(format!("table {}.{} does not exist", database, table)))
    }
}

pub struct JsonCatalogAdapter {
    path: PathBuf,
    document: Mutex<CatalogDocument>,
}

impl JsonCatalogAdapter {
    /// Loads the catalog at `path`; a missing file is an empty catalog.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)
                .map_err(|e| ExtractError::Catalog(format!("{}: {}", path.display(), e)))?
        } else {
            CatalogDocument::default()
        };
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    fn document(&self) -> Result<MutexGuard<'_, CatalogDocument>> {
        self.document
            .lock()
            .map_err(|_| ExtractError::Catalog("catalog lock poisoned".into()))
    }

    fn update<T>(&self, f: impl FnOnce(&mut CatalogDocument) -> Result<T>) -> Result<T> {
        let mut document = self.document()?;
        let value = f(&mut document)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&*document).map_err(|e| ExtractError::Catalog(e.to_string()))?;
        std::fs::write(&self.path, json)?;
        debug!("Catalog saved to {}", self.path.display());
        Ok(value)
    }
}

impl CatalogPort for JsonCatalogAdapter {
    fn get_table(&self, database: &str, table: &str) -> Result<Option<CatalogTable>> {
        Ok(self.document()?.find(database, table).map(|t| t.table.clone()))
    }

    fn create_table(&self, table: &CatalogTable) -> Result<()> {
        self.update(|doc| {
            if doc.find(&table.database, &table.name).is_some() {
                return Err(ExtractError::Catalog(format!(
                    "table {}.{} already exists",
                    table.database, table.name
                )));
            }
            doc.tables.push(StoredTable {
                table: table.clone(),
                partitions: Vec::new(),
            });
            Ok(())
        })
    }

    fn alter_table(&self, table: &CatalogTable) -> Result<()> {
        self.update(|doc| {
            doc.find_mut(&table.database, &table.name)?.table = table.clone();
            Ok(())
        })
    }

    fn get_partition(&self, database: &str, table: &str, values: &[String]) -> Result<Option<CatalogPartition>> {
        Ok(self
            .document()?
            .find(database, table)
            .and_then(|t| t.partitions.iter().find(|p| p.values == values))
            .cloned())
    }

    fn add_partition(&self, database: &str, table: &str, partition: &CatalogPartition) -> Result<()> {
        self.update(|doc| {
            let stored = doc.find_mut(database, table)?;
            if stored.partitions.iter().any(|p| p.values == partition.values) {
                return Err(ExtractError::Catalog(format!(
                    "partition {:?} of {}.{} already exists",
                    partition.values, database, table
                )));
            }
            stored.partitions.push(partition.clone());
            Ok(())
        })
    }

    fn alter_partition(&self, database: &str, table: &str, partition: &CatalogPartition) -> Result<()> {
        self.update(|doc| {
            let existing = doc
                .find_mut(database, table)?
                .partitions
                .iter_mut()
                .find(|p| p.values == partition.values)
                .ok_or_else(|| {
                    ExtractError::Catalog(format!(
                        "partition {:?} of {}.{} does not exist",
                        partition.values, database, table
                    ))
                })?;
            *existing = partition.clone();
            Ok(())
        })
    }
}
