//! Job building.
//!
//! Stacks one work item per (tenant, tenant-scoped kind) in tenant order,
//! then one per global kind, probing each for its record count.

use tracing::{debug, info, warn};

use sync_types::{Scope, TenantSettings};

use crate::args::SyncArgs;
use crate::batch::probe_query;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::hooks::SyncHooks;
use crate::job::{SyncJob, WorkItem};
use crate::registry::{ContentKindRegistry, Indexable, TenantDirectory};

pub(crate) struct JobBuilder<'a> {
    pub registry: &'a ContentKindRegistry,
    pub tenants: &'a dyn TenantDirectory,
    pub hooks: &'a dyn SyncHooks,
    pub config: &'a SyncConfig,
}

impl JobBuilder<'_> {
    pub fn build(&self, args: &SyncArgs) -> Result<SyncJob, SyncError> {
        for kind in &args.kinds {
            if self.registry.get(kind).is_none() {
                return Err(SyncError::UnknownContentKind(kind.to_string()));
            }
        }

        let mut job = SyncJob::new(args.clone(), self.config.network);

        if self.config.network {
            for tenant in self.tenants.tenants(args.network_wide) {
                if !tenant.indexable {
                    debug!(tenant = %tenant.id, "Skipping non-indexable tenant");
                    continue;
                }
                for indexable in self.tenant_kinds(args) {
                    let item = self.tenant_item(&tenant, indexable, args);
                    job.work_stack.push_back(item);
                    job.add_alias_target(indexable.slug());
                }
            }
        } else {
            let tenant = self.single_tenant(args)?;
            for indexable in self.tenant_kinds(args) {
                let item = self.tenant_item(&tenant, indexable, args);
                job.work_stack.push_back(item);
            }
        }

        for indexable in self
            .registry
            .by_scope(true)
            .filter(|i| args.includes_kind(i.slug()))
        {
            let scope = Scope::global(indexable.slug().clone());
            let found = self.probe(indexable, &scope, args);
            job.work_stack
                .push_back(WorkItem::new(scope, args.put_mapping).with_found_items(found));
        }

        info!(
            items = job.work_stack.len(),
            aliases = job.pending_alias_targets.len(),
            network = job.network,
            "Built sync job"
        );
        Ok(job)
    }

    fn tenant_kinds<'b>(&'b self, args: &'b SyncArgs) -> impl Iterator<Item = &'b Indexable> {
        self.registry
            .by_scope(false)
            .filter(move |i| args.includes_kind(i.slug()))
    }

    fn single_tenant(&self, args: &SyncArgs) -> Result<TenantSettings, SyncError> {
        match args.tenant {
            Some(id) => self
                .tenants
                .get(id)
                .ok_or_else(|| SyncError::Config(format!("unknown tenant: {}", id))),
            None => self
                .tenants
                .current()
                .ok_or_else(|| SyncError::Config("no tenants configured".to_string())),
        }
    }

    fn tenant_item(
        &self,
        tenant: &TenantSettings,
        indexable: &Indexable,
        args: &SyncArgs,
    ) -> WorkItem {
        let scope = Scope::tenant(tenant.id, indexable.slug().clone());
        let found = self.probe(indexable, &scope, args);
        WorkItem::new(scope, args.put_mapping)
            .with_url(tenant.url())
            .with_found_items(found)
    }

    /// Record count of a scope; a failing probe counts as empty.
    fn probe(&self, indexable: &Indexable, scope: &Scope, args: &SyncArgs) -> u64 {
        let query = self.hooks.transform_query(scope, probe_query(args));
        match indexable.source.query(scope, &query) {
            Ok(page) => page.total_objects,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Probe query failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoHooks;
    use crate::registry::ConfiguredTenants;
    use crate::test_support::{posts, terms, Fixture, ScriptedSink};
    use sync_types::{ContentKind, TenantId};

    fn tenants() -> ConfiguredTenants {
        let mut third = TenantSettings::new(3);
        third.indexable = false;
        let mut first = TenantSettings::new(1);
        first.domain = "example.org".to_string();
        ConfiguredTenants::new(vec![first, TenantSettings::new(2), third])
    }

    fn kinds(job: &SyncJob) -> Vec<String> {
        job.work_stack.iter().map(|i| i.scope().to_string()).collect()
    }

    #[test]
    fn test_single_tenant_order() {
        let fixture = Fixture::new(ScriptedSink::new());
        fixture.source.add_range(&posts(1), 1..=700);
        let registry = fixture.registry();
        let tenants = tenants();
        let config = SyncConfig::default();
        let builder = JobBuilder {
            registry: &registry,
            tenants: &tenants,
            hooks: &NoHooks,
            config: &config,
        };

        let job = builder.build(&SyncArgs::default().with_put_mapping(true)).unwrap();

        assert_eq!(kinds(&job), vec!["post@1", "term@1", "user@global"]);
        assert_eq!(job.work_stack[0].found_items, 700);
        assert_eq!(job.work_stack[0].url.as_deref(), Some("example.org"));
        assert!(job.work_stack.iter().all(|i| i.put_mapping));
        assert!(job.pending_alias_targets.is_empty());
        // Probes are zero-effect queries of one record
        assert!(fixture.source.queries().iter().all(|q| q.per_page == 1));
    }

    #[test]
    fn test_network_order_and_aliases() {
        let fixture = Fixture::new(ScriptedSink::new());
        fixture.source.add_range(&terms(2), 1..=5);
        let registry = fixture.registry();
        let tenants = tenants();
        let config = SyncConfig::default().with_network(true);
        let builder = JobBuilder {
            registry: &registry,
            tenants: &tenants,
            hooks: &NoHooks,
            config: &config,
        };

        let job = builder.build(&SyncArgs::default()).unwrap();

        assert_eq!(
            kinds(&job),
            vec!["post@1", "term@1", "post@2", "term@2", "user@global"]
        );
        assert_eq!(job.work_stack[3].found_items, 5);
        assert_eq!(
            job.pending_alias_targets,
            vec![ContentKind::new("post"), ContentKind::new("term")]
        );
    }

    #[test]
    fn test_network_wide_limit_and_kind_filter() {
        let fixture = Fixture::new(ScriptedSink::new());
        let registry = fixture.registry();
        let tenants = tenants();
        let config = SyncConfig::default().with_network(true);
        let builder = JobBuilder {
            registry: &registry,
            tenants: &tenants,
            hooks: &NoHooks,
            config: &config,
        };

        let args = SyncArgs::default()
            .with_network_wide(1)
            .with_kinds(vec![ContentKind::new("term")]);
        let job = builder.build(&args).unwrap();

        assert_eq!(kinds(&job), vec!["term@1"]);
    }

    #[test]
    fn test_unknown_kind_and_tenant() {
        let fixture = Fixture::new(ScriptedSink::new());
        let registry = fixture.registry();
        let tenants = tenants();
        let config = SyncConfig::default();
        let builder = JobBuilder {
            registry: &registry,
            tenants: &tenants,
            hooks: &NoHooks,
            config: &config,
        };

        let err = builder
            .build(&SyncArgs::default().with_kinds(vec![ContentKind::new("widget")]))
            .unwrap_err();
        assert!(matches!(err, SyncError::UnknownContentKind(_)));

        let err = builder
            .build(&SyncArgs::default().with_tenant(TenantId(9)))
            .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_failing_probe_counts_as_empty() {
        let fixture = Fixture::new(ScriptedSink::new());
        fixture.source.add_range(&posts(1), 1..=10);
        fixture.source.set_fail(true);
        let registry = fixture.registry();
        let tenants = tenants();
        let config = SyncConfig::default();
        let builder = JobBuilder {
            registry: &registry,
            tenants: &tenants,
            hooks: &NoHooks,
            config: &config,
        };

        let job = builder.build(&SyncArgs::default()).unwrap();

        assert_eq!(job.work_stack.len(), 3);
        assert!(job.work_stack.iter().all(|i| i.found_items == 0));
    }
}
