//! Per-step cache lifetime.
//!
//! Caches that must not outlive a step register with the orchestrator's
//! `StepContext` as `StepCache` and are reset after every work-item step.

use std::sync::Arc;

use tracing::debug;

/// A cache that can be emptied between steps.
pub trait StepCache: Send + Sync {
    /// Drop everything cached
    fn reset(&self);

    /// Name for logging
    fn name(&self) -> &str;
}

/// Caches reset at the end of each step.
#[derive(Default)]
pub struct StepContext {
    caches: Vec<Arc<dyn StepCache>>,
}

impl StepContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache to reset after each step.
    pub fn register_cache(&mut self, cache: Arc<dyn StepCache>) {
        self.caches.push(cache);
    }

    /// Reset every registered cache.
    pub fn clear(&mut self) {
        for cache in &self.caches {
            cache.reset();
            debug!(cache = cache.name(), "Reset step cache");
        }
    }
}
