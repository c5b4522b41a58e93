// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use lazy_static::lazy_static;
use std::sync::Arc;

use crate::threads::WorkerRegistry;

lazy_static! {
    static ref RESOURCES: Resource = Resource::new();
}

/// Resource struct includes all the global and possibly shared
/// resources for the daemon.
pub struct Resource {
    workers: Arc<WorkerRegistry>,
}

impl Resource {
    pub fn new() -> Self {
        Self { workers: Arc::new(WorkerRegistry::new()) }
    }
}

impl Default for Resource {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-wide worker registry.
pub fn clone_registry() -> Arc<WorkerRegistry> {
    Arc::clone(&RESOURCES.workers)
}
