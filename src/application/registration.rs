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

//! Publishes written datasets to the catalog: the table is created or
//! altered, then the run's partition is added or moved to its new location.

use crate::domain::errors::{ExtractError, Result};
use crate::ports::catalog_port::{CatalogPartition, CatalogPort, CatalogTable};
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registered {
    Created,
    Updated,
    Unchanged,
}

pub struct CatalogRegistrar<'a> {
    catalog: &'a dyn CatalogPort,
}

impl<'a> CatalogRegistrar<'a> {
    pub fn new(catalog: &'a dyn CatalogPort) -> Self {
        Self { catalog }
    }

    pub fn register_table(&self, table: &CatalogTable) -> Result<Registered> {
        match self.catalog.get_table(&table.database, &table.name)? {
            None => {
                self.catalog.create_table(table)?;
                info!("Created table {}.{} at {}", table.database, table.name, table.location);
                Ok(Registered::Created)
            }
            Some(existing) if existing == *table => {
                debug!("Table {}.{} is up to date", table.database, table.name);
                Ok(Registered::Unchanged)
            }
            Some(_) => {
                self.catalog.alter_table(table)?;
                info!("Altered table {}.{}", table.database, table.name);
                Ok(Registered::Updated)
            }
        }
    }

    pub fn register_partition(&self, table: &CatalogTable, partition: &CatalogPartition) -> Result<Registered> {
        if table.partition_keys.len() != partition.values.len() {
            return Err(ExtractError::Catalog(format!(
                "Partition key size is {} but partition value size is {}",
                table.partition_keys.len(),
                partition.values.len()
            )));
        }

        match self
            .catalog
            .get_partition(&table.database, &table.name, &partition.values)?
        {
            None => {
                self.catalog.add_partition(&table.database, &table.name, partition)?;
                info!(
                    "Added partition {:?} to table {} with location {}",
                    partition.values, table.name, partition.location
                );
                Ok(Registered::Created)
            }
            Some(existing) if existing.location == partition.location => {
                debug!(
                    "Partition {:?} in table {} already exists and no need to update",
                    partition.values, table.name
                );
                Ok(Registered::Unchanged)
            }
            Some(_) => {
                self.catalog.alter_partition(&table.database, &table.name, partition)?;
                info!(
                    "Updated partition {:?} in table {} with location {}",
                    partition.values, table.name, partition.location
                );
                Ok(Registered::Updated)
            }
        }
    }
}
