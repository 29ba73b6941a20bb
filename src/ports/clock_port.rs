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

//! # Clock Port
//!
//! Every wait in the job state machine goes through this trait so tests can
//! drive batch transitions without real time passing.

use std::time::Duration;

pub trait Clock: Send + Sync {
    fn sleep(&self, duration: Duration);
}
