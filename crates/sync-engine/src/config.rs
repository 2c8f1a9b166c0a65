//! Engine configuration.

use sync_types::Settings;

use crate::args::SyncArgs;
use crate::hooks::SyncHooks;

/// Defaults a run falls back to when its arguments leave a value unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Records per batch
    pub default_per_page: usize,
    /// Delivery attempts per batch
    pub total_attempts: u32,
    /// Page by last processed ID instead of offset
    pub advanced_pagination: bool,
    /// Multi-tenant installation
    pub network: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_per_page: 350,
            total_attempts: 1,
            advanced_pagination: false,
            network: false,
        }
    }
}

impl SyncConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_per_page: settings.bulk_per_page,
            total_attempts: settings.total_attempts,
            advanced_pagination: settings.advanced_pagination,
            network: settings.network,
        }
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.default_per_page = per_page;
        self
    }

    pub fn with_total_attempts(mut self, attempts: u32) -> Self {
        self.total_attempts = attempts;
        self
    }

    pub fn with_advanced_pagination(mut self, enabled: bool) -> Self {
        self.advanced_pagination = enabled;
        self
    }

    pub fn with_network(mut self, network: bool) -> Self {
        self.network = network;
        self
    }

    /// Resolve the effective batch parameters of a run.
    pub fn resolve(&self, args: &SyncArgs, hooks: &dyn SyncHooks) -> BatchPlan {
        let per_page = args.resolve_per_page(hooks.per_page(self.default_per_page));
        let attempts = hooks
            .batch_attempts(args.total_attempts.unwrap_or(self.total_attempts))
            .max(1);
        BatchPlan {
            per_page,
            total_attempts: attempts,
            advanced_pagination: args
                .advanced_pagination
                .unwrap_or(self.advanced_pagination),
            nobulk: args.nobulk,
        }
    }
}

/// Effective batch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub per_page: usize,
    pub total_attempts: u32,
    pub advanced_pagination: bool,
    pub nobulk: bool,
}
