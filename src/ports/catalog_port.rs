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

//! # Catalog Port
//!
//! The table catalog where extracted datasets are published. Lookups return
//! `Option` so "does not exist" is an ordinary value, not an error.

use crate::domain::errors::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogTable {
    pub database: String,
    pub name: String,
    pub location: String,
    pub columns: Vec<String>,
    pub partition_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogPartition {
    pub values: Vec<String>,
    pub location: String,
}

pub trait CatalogPort: Send + Sync {
    fn get_table(&self, database: &str, table: &str) -> Result<Option<CatalogTable>>;

    fn create_table(&self, table: &CatalogTable) -> Result<()>;

    fn alter_table(&self, table: &CatalogTable) -> Result<()>;

    fn get_partition(&self, database: &str, table: &str, values: &[String]) -> Result<Option<CatalogPartition>>;

    fn add_partition(&self, database: &str, table: &str, partition: &CatalogPartition) -> Result<()>;

    fn alter_partition(&self, database: &str, table: &str, partition: &CatalogPartition) -> Result<()>;
}
