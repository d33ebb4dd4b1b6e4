//! Restoration engine.
//!
//! Undoes every resource side effect caused by one causal reference (a
//! service ticket or a field report), without losing the ability to audit
//! what happened. Restoration is deliberately lenient: it runs after the
//! caller's own close/delete has already been decided, so a resource that
//! cannot be restored is logged and counted, never a reason to abort the
//! rest.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        resource::{self, ResourceStatus},
        resource_movement::{self, CausalRef, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    ledger::{self, MovementDraft},
    locks::ResourceLockRegistry,
    services::{resource_lifecycle::WAREHOUSE_LOCATION, TransitionContext},
};

/// Outcome of one `restore_by_causal_ref` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestorationReport {
    /// Resources put back to their pre-reference state in this call.
    pub restored: usize,
    /// Resources skipped: already compensated by an earlier call, missing,
    /// or without enough recorded information to restore.
    pub skipped: usize,
    /// Resources whose restoration failed; each failure is logged and left
    /// for manual correction.
    pub failed: usize,
}

/// Service replaying the movements of a causal reference to undo them.
#[derive(Clone)]
pub struct RestorationService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    locks: ResourceLockRegistry,
}

impl RestorationService {
    /// Creates a new restoration service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, locks: ResourceLockRegistry) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    /// Returns every resource touched by `causal_ref` to its state before
    /// the reference's first transition.
    ///
    /// Movements are processed oldest first; the oldest entry for a resource
    /// defines its pre-reference state, and each resource is restored at
    /// most once per call. A resource whose movements all precede its latest
    /// compensating `Restore` entry was handled by an earlier call and is
    /// counted as skipped, so repeated calls are no-ops. Movements recorded
    /// after a compensation (a reopened ticket) are restored again, from the
    /// oldest entry made since.
    ///
    /// Cleanup policy by reference kind: ticket movements are retained as
    /// audit history (the compensating entries carry the ticket reference);
    /// field-report movements are purged after restoration (the compensating
    /// entries carry no reference, so they survive the purge).
    #[instrument(skip(self, ctx))]
    pub async fn restore_by_causal_ref(
        &self,
        causal_ref: CausalRef,
        ctx: TransitionContext,
    ) -> Result<RestorationReport, ServiceError> {
        let db = self.db_pool.as_ref();
        let movements = ledger::movements_by_causal_ref(db, causal_ref).await?;

        let mut report = RestorationReport::default();

        if movements.is_empty() {
            return Ok(report);
        }

        // Latest compensation per resource. Only movements newer than this
        // cutoff are still outstanding.
        let mut last_restore: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for m in &movements {
            if m.movement_type() == Some(MovementType::Restore) {
                let entry = last_restore.entry(m.resource_id).or_insert(m.created_at);
                if m.created_at > *entry {
                    *entry = m.created_at;
                }
            }
        }

        let mut handled: HashSet<Uuid> = HashSet::new();
        let mut compensated: HashSet<Uuid> = HashSet::new();

        for movement in &movements {
            if movement.movement_type() == Some(MovementType::Restore) {
                continue;
            }

            let resource_id = movement.resource_id;
            if handled.contains(&resource_id) {
                continue;
            }

            if let Some(cutoff) = last_restore.get(&resource_id) {
                if movement.created_at <= *cutoff {
                    compensated.insert(resource_id);
                    continue;
                }
            }

            handled.insert(resource_id);

            let _guard = self.locks.acquire(resource_id).await;

            match self.restore_resource(resource_id, movement, causal_ref, &ctx).await {
                Ok(Some(applied)) => {
                    info!(
                        %resource_id,
                        status = %applied,
                        "resource restored for {} {}",
                        causal_ref.kind(),
                        causal_ref.id()
                    );
                    report.restored += 1;
                }
                Ok(None) => {
                    report.skipped += 1;
                }
                Err(err) => {
                    // Best effort: one stuck resource must not block the
                    // caller's close/delete or the remaining resources.
                    warn!(
                        %resource_id,
                        error = %err,
                        "failed to restore resource for {} {}",
                        causal_ref.kind(),
                        causal_ref.id()
                    );
                    report.failed += 1;
                }
            }
        }

        report.skipped += compensated
            .iter()
            .filter(|id| !handled.contains(id))
            .count();

        if matches!(causal_ref, CausalRef::FieldReport(_)) {
            let purged = ledger::delete_movements_by_causal_ref(db, causal_ref).await?;
            info!(
                purged,
                "purged movements for deleted field report {}",
                causal_ref.id()
            );
        }

        if let Err(e) = self
            .event_sender
            .send(Event::RestorationCompleted {
                causal_ref_kind: causal_ref.kind().to_string(),
                causal_ref_id: causal_ref.id(),
                restored: report.restored,
                skipped: report.skipped,
                failed: report.failed,
            })
            .await
        {
            warn!(error = %e, "failed to publish restoration event");
        }

        Ok(report)
    }

    /// Restore one resource from the movement that defines its
    /// pre-reference state. Returns the applied status, or `None` when
    /// there was nothing to act on.
    async fn restore_resource(
        &self,
        resource_id: Uuid,
        movement: &resource_movement::Model,
        causal_ref: CausalRef,
        ctx: &TransitionContext,
    ) -> Result<Option<ResourceStatus>, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let Some(res) = ledger::find_resource(&txn, resource_id).await? else {
            warn!(%resource_id, "resource no longer exists, skipping restoration");
            return Ok(None);
        };

        let before = res.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "Resource {} has unknown status '{}'",
                res.id, res.status
            ))
        })?;

        let custodian_after;
        let applied;

        let mut active: resource::ActiveModel = res.into();

        if movement.is_substitute_loan {
            // Substitute equipment has no prior custody state to put back;
            // it goes home to the warehouse.
            applied = ResourceStatus::Available;
            custodian_after = None;
            active.custodian_id = Set(None);
            active.status = Set(applied.as_str().to_string());
            active.location = Set(Some(WAREHOUSE_LOCATION.to_string()));
            active.assigned_at = Set(None);
        } else if movement.has_snapshot() {
            // Full snapshot: every field back exactly as it was. A recorded
            // original custodian means the unit was active at them.
            applied = ResourceStatus::Active;
            custodian_after = movement.original_custodian_id;
            active.custodian_id = Set(movement.original_custodian_id);
            active.status = Set(applied.as_str().to_string());
            active.location = Set(movement.original_location.clone());
            active.assigned_at = Set(movement.original_assigned_at);
            active.sale_date = Set(movement.original_sale_date);
            active.sale_price = Set(movement.original_sale_price);
            active.next_maintenance_due = Set(movement.original_next_maintenance_due);
        } else if let Some(prev) = movement
            .previous_status
            .as_deref()
            .and_then(ResourceStatus::parse)
        {
            applied = prev;
            if prev == ResourceStatus::Available {
                custodian_after = None;
                active.custodian_id = Set(None);
                active.location = Set(Some(WAREHOUSE_LOCATION.to_string()));
                active.assigned_at = Set(None);
            } else {
                custodian_after = movement.custodian_id;
            }
            active.status = Set(prev.as_str().to_string());
        } else {
            // Neither snapshot nor previous status recorded.
            return Ok(None);
        }

        active.update(&txn).await?;

        // Ticket restorations keep their reference: audit trail and the
        // marker that makes a second restoration call a no-op. Field-report
        // restorations stay untagged so the purge below does not eat them.
        let compensation_ref = match causal_ref {
            CausalRef::Ticket(_) => Some(causal_ref),
            CausalRef::FieldReport(_) => None,
        };

        ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(before),
                new_status: Some(applied),
                custodian_id: custodian_after,
                causal_ref: compensation_ref,
                actor_id: ctx.actor_id,
                note: ctx.note.clone().or_else(|| {
                    Some(format!(
                        "Restored after {} {} closure",
                        causal_ref.kind(),
                        causal_ref.id()
                    ))
                }),
                ..MovementDraft::new(resource_id, MovementType::Restore)
            },
        )
        .await?;

        txn.commit().await?;

        Ok(Some(applied))
    }
}
