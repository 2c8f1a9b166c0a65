//! Batch delivery and accounting.
//!
//! A batch is never persisted: its query is recomputed every step from the
//! job offset and the item's last processed ID.

use tracing::{debug, warn};

use sync_types::{ObjectId, Scope};

use crate::args::SyncArgs;
use crate::config::BatchPlan;
use crate::hooks::SyncHooks;
use crate::registry::Indexable;
use crate::sink::{ItemError, TransportError};
use crate::source::QueryArgs;

/// Source query for a batch.
///
/// With advanced pagination and a known resume point the query pages by ID
/// (offset 0, exclusive lower bound); otherwise it pages by offset.
pub(crate) fn batch_query(
    args: &SyncArgs,
    plan: &BatchPlan,
    offset: u64,
    last_processed_id: Option<ObjectId>,
) -> QueryArgs {
    let resume_after_id = if plan.advanced_pagination {
        last_processed_id
    } else {
        None
    };
    QueryArgs {
        per_page: plan.per_page,
        offset: if resume_after_id.is_some() { 0 } else { offset },
        resume_after_id,
        ..probe_query(args)
    }
}

/// Zero-effect existence probe: the run's filters with page size 1.
pub(crate) fn probe_query(args: &SyncArgs) -> QueryArgs {
    QueryArgs {
        per_page: 1,
        offset: 0,
        include: args.include.clone(),
        content_types: args.content_types.clone(),
        lower_id: args.lower_id,
        upper_id: args.upper_id,
        resume_after_id: None,
    }
}

/// Result of the delivery loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttemptOutcome {
    /// Every queued record was indexed
    Clean,
    /// The destination answered but rejected some records
    Partial(Vec<(ObjectId, ItemError)>),
    /// The destination could not be reached
    Transport(TransportError),
}

#[derive(Debug)]
pub(crate) struct Delivery {
    pub outcome: AttemptOutcome,
    pub attempts: u32,
}

/// Deliver queued IDs up to `plan.total_attempts` times, stopping at the
/// first clean attempt. Every attempt resends the whole batch.
pub(crate) fn deliver(
    indexable: &Indexable,
    scope: &Scope,
    ids: &[ObjectId],
    plan: &BatchPlan,
    hooks: &dyn SyncHooks,
) -> Delivery {
    let mut outcome = AttemptOutcome::Clean;
    let mut attempts = 0;

    for attempt in 1..=plan.total_attempts {
        attempts = attempt;
        hooks.new_attempt(attempt, plan.total_attempts);

        outcome = if plan.nobulk {
            deliver_one_by_one(indexable, scope, ids, hooks)
        } else {
            let result = indexable.sink.bulk_index(scope, ids);
            hooks.after_bulk_index(scope, ids, &result);
            match result {
                Ok(response) => {
                    let failed = response.failed_items();
                    if failed.is_empty() {
                        AttemptOutcome::Clean
                    } else {
                        AttemptOutcome::Partial(failed)
                    }
                }
                Err(e) => AttemptOutcome::Transport(e),
            }
        };

        if outcome == AttemptOutcome::Clean {
            break;
        }
        debug!(
            scope = %scope,
            attempt,
            total_attempts = plan.total_attempts,
            "Batch delivery attempt failed"
        );
    }

    Delivery { outcome, attempts }
}

fn deliver_one_by_one(
    indexable: &Indexable,
    scope: &Scope,
    ids: &[ObjectId],
    hooks: &dyn SyncHooks,
) -> AttemptOutcome {
    let mut failed = Vec::new();
    for id in ids {
        let result = indexable.sink.index(scope, *id, true);
        hooks.after_object_index(scope, *id, &result);
        match result {
            Ok(response) => {
                if let Some(error) = response.error {
                    failed.push((*id, error));
                }
            }
            Err(e) => return AttemptOutcome::Transport(e),
        }
    }
    if failed.is_empty() {
        AttemptOutcome::Clean
    } else {
        AttemptOutcome::Partial(failed)
    }
}

/// Counter changes for one delivered batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BatchAccount {
    pub synced: u64,
    pub failed: u64,
    pub errors: Vec<String>,
    /// Warning text to report, if any
    pub warning: Option<String>,
}

/// Per-record error line: `<id> (<label>): [<type>] <reason>`.
pub(crate) fn format_item_error(id: ObjectId, singular: &str, error: &ItemError) -> String {
    format!("{} ({}): [{}] {}", id, singular, error.error_type, error.reason)
}

/// Turn a delivery outcome into counter changes.
pub(crate) fn account(outcome: &AttemptOutcome, queued: usize, singular: &str) -> BatchAccount {
    let queued = queued as u64;
    match outcome {
        AttemptOutcome::Clean => BatchAccount {
            synced: queued,
            ..Default::default()
        },
        AttemptOutcome::Transport(e) => {
            warn!(error = %e, queued, "Batch delivery failed");
            BatchAccount {
                synced: 0,
                failed: queued,
                errors: e.messages.clone(),
                warning: Some(e.messages.join("\n")),
            }
        }
        AttemptOutcome::Partial(failed) => {
            let lines: Vec<String> = failed
                .iter()
                .map(|(id, error)| format_item_error(*id, singular, error))
                .collect();
            let failed_count = (failed.len() as u64).min(queued);
            BatchAccount {
                synced: queued - failed_count,
                failed: failed_count,
                warning: Some(lines.join("\n")),
                errors: lines,
            }
        }
    }
}
