use std::sync::Arc;

use docflow_core::{HealthAggregator, JobQueue, JobRegistry};

#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    pub registry: JobRegistry,
    pub health: Arc<HealthAggregator>,
    pub default_retry_count: u32,
}

impl AppState {
    pub fn new(queue: JobQueue, registry: JobRegistry, health: Arc<HealthAggregator>, default_retry_count: u32) -> Self {
        Self {
            queue,
            registry,
            health,
            default_retry_count,
        }
    }
}
