//! Resource state machine.
//!
//! Validates and executes transitions on one resource, producing exactly one
//! movement per transition and updating the resource's current fields in the
//! same transaction. Preconditions are strict: a violated precondition is
//! `ServiceError::InvalidState` and nothing is written.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        resource::{self, ResourceStatus},
        resource_movement::{self, MovementType},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    ledger::{self, MovementDraft, Snapshot},
    locks::ResourceLockRegistry,
    services::TransitionContext,
};

pub const WAREHOUSE_LOCATION: &str = "warehouse";
pub const REPAIR_LOCATION: &str = "repair";

pub fn custodian_location(custodian_id: Uuid) -> String {
    format!("custodian:{}", custodian_id)
}

/// Service for executing resource lifecycle transitions.
#[derive(Clone)]
pub struct ResourceLifecycleService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    locks: ResourceLockRegistry,
}

impl ResourceLifecycleService {
    /// Creates a new lifecycle service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: EventSender, locks: ResourceLockRegistry) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    /// Registers a new resource. Resources are created `Available`, in the
    /// warehouse, with no custodian.
    #[instrument(skip(self))]
    pub async fn create_resource(
        &self,
        code: String,
        notes: Option<String>,
        maintenance_interval_days: Option<i32>,
    ) -> Result<resource::Model, ServiceError> {
        if code.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Resource code cannot be empty".to_string(),
            ));
        }

        let db = self.db_pool.as_ref();

        let model = resource::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            status: Set(ResourceStatus::Available.as_str().to_string()),
            custodian_id: Set(None),
            location: Set(Some(WAREHOUSE_LOCATION.to_string())),
            assigned_at: Set(None),
            sale_date: Set(None),
            sale_price: Set(None),
            next_maintenance_due: Set(None),
            maintenance_interval_days: Set(maintenance_interval_days),
            notes: Set(notes),
            ..Default::default()
        };

        let created = model.insert(db).await?;

        if let Err(e) = self.event_sender.send(Event::ResourceCreated(created.id)).await {
            warn!(error = %e, "failed to publish event");
        }

        Ok(created)
    }

    /// Fetches a resource by id.
    #[instrument(skip(self))]
    pub async fn get_resource(&self, resource_id: Uuid) -> Result<resource::Model, ServiceError> {
        ledger::require_resource(self.db_pool.as_ref(), resource_id).await
    }

    /// Full movement history of a resource, oldest first.
    #[instrument(skip(self))]
    pub async fn movement_history(
        &self,
        resource_id: Uuid,
    ) -> Result<Vec<resource_movement::Model>, ServiceError> {
        let db = self.db_pool.as_ref();
        ledger::require_resource(db, resource_id).await?;
        ledger::movements_for_resource(db, resource_id).await
    }

    /// Deletes a resource. Rejected while any movement references it; the
    /// ledger is the audit trail and never loses entries to a row delete.
    #[instrument(skip(self))]
    pub async fn delete_resource(&self, resource_id: Uuid) -> Result<(), ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let db = self.db_pool.as_ref();

        let res = ledger::require_resource(db, resource_id).await?;

        let movements = ledger::count_movements_for_resource(db, resource_id).await?;
        if movements > 0 {
            return Err(ServiceError::Conflict(format!(
                "Resource {} has {} ledger entries and cannot be deleted",
                res.code, movements
            )));
        }

        resource::Entity::delete_by_id(resource_id)
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(())
    }

    /// Assigns an available resource to a custodian.
    ///
    /// The source state is `Available`, the canonical empty state, so no
    /// snapshot is captured.
    #[instrument(skip(self, ctx))]
    pub async fn assign_to_custodian(
        &self,
        resource_id: Uuid,
        custodian_id: Uuid,
        target_status: Option<ResourceStatus>,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let target = target_status.unwrap_or(ResourceStatus::OnLoan);
        if !matches!(target, ResourceStatus::OnLoan | ResourceStatus::Active) {
            return Err(ServiceError::ValidationError(format!(
                "Cannot assign a resource into status {}",
                target
            )));
        }

        let movement = self
            .assign_internal(resource_id, custodian_id, target, false, ctx)
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ResourceAssigned {
                resource_id,
                custodian_id,
            })
            .await
        {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    /// Assigns an available resource to a custodian as substitute equipment
    /// (e.g. while their own unit is in repair). Tagged on the movement so
    /// restoration returns it to the warehouse instead of a prior custody
    /// state.
    #[instrument(skip(self, ctx))]
    pub async fn loan_substitute(
        &self,
        resource_id: Uuid,
        custodian_id: Uuid,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let movement = self
            .assign_internal(resource_id, custodian_id, ResourceStatus::OnLoan, true, ctx)
            .await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ResourceLoaned {
                resource_id,
                custodian_id,
                interrupted_active: false,
            })
            .await
        {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    async fn assign_internal(
        &self,
        resource_id: Uuid,
        custodian_id: Uuid,
        target: ResourceStatus,
        is_substitute_loan: bool,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;

        if current != ResourceStatus::Available {
            return Err(ServiceError::InvalidState(format!(
                "Resource {} is not available (current status: {})",
                res.code, current
            )));
        }

        let now = Utc::now();
        let mut active: resource::ActiveModel = res.into();
        active.custodian_id = Set(Some(custodian_id));
        active.status = Set(target.as_str().to_string());
        active.assigned_at = Set(Some(now));
        active.location = Set(Some(custodian_location(custodian_id)));
        active.update(&txn).await?;

        let movement = ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(ResourceStatus::Available),
                new_status: Some(target),
                custodian_id: Some(custodian_id),
                causal_ref: ctx.causal_ref,
                is_substitute_loan,
                actor_id: ctx.actor_id,
                note: ctx.note,
                cost: ctx.cost,
                ..MovementDraft::new(resource_id, MovementType::Assignment)
            },
        )
        .await?;

        txn.commit().await?;

        info!(%resource_id, %custodian_id, status = %target, "resource assigned");

        Ok(movement)
    }

    /// Loans a resource temporarily, even when it is active at another
    /// custodian.
    ///
    /// From `Available` this behaves like a plain assignment. From `Active`
    /// it is a nested interruption: the full pre-loan state is snapshotted
    /// into the movement so restoration can put it back exactly.
    /// `assigned_at` is left untouched in that case; it records the original
    /// assignment start, not the interruption.
    #[instrument(skip(self, ctx))]
    pub async fn loan_temporarily(
        &self,
        resource_id: Uuid,
        custodian_id: Uuid,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;

        let movement = match current {
            ResourceStatus::Available => {
                let now = Utc::now();
                let mut active: resource::ActiveModel = res.into();
                active.custodian_id = Set(Some(custodian_id));
                active.status = Set(ResourceStatus::OnLoan.as_str().to_string());
                active.assigned_at = Set(Some(now));
                active.location = Set(Some(custodian_location(custodian_id)));
                active.update(&txn).await?;

                ledger::append_movement(
                    &txn,
                    MovementDraft {
                        previous_status: Some(ResourceStatus::Available),
                        new_status: Some(ResourceStatus::OnLoan),
                        custodian_id: Some(custodian_id),
                        causal_ref: ctx.causal_ref,
                        actor_id: ctx.actor_id,
                        note: ctx.note,
                        cost: ctx.cost,
                        ..MovementDraft::new(resource_id, MovementType::Assignment)
                    },
                )
                .await?
            }
            ResourceStatus::Active => {
                let snapshot = Snapshot::capture(&res);

                let mut active: resource::ActiveModel = res.into();
                active.custodian_id = Set(Some(custodian_id));
                active.status = Set(ResourceStatus::OnLoan.as_str().to_string());
                active.location = Set(Some(custodian_location(custodian_id)));
                active.update(&txn).await?;

                ledger::append_movement(
                    &txn,
                    MovementDraft {
                        previous_status: Some(ResourceStatus::Active),
                        new_status: Some(ResourceStatus::OnLoan),
                        custodian_id: Some(custodian_id),
                        snapshot: Some(snapshot),
                        causal_ref: ctx.causal_ref,
                        actor_id: ctx.actor_id,
                        note: ctx.note,
                        cost: ctx.cost,
                        ..MovementDraft::new(resource_id, MovementType::Assignment)
                    },
                )
                .await?
            }
            other => {
                return Err(ServiceError::InvalidState(format!(
                    "Resource {} cannot be loaned from status {}",
                    res.code, other
                )));
            }
        };

        txn.commit().await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ResourceLoaned {
                resource_id,
                custodian_id,
                interrupted_active: current == ResourceStatus::Active,
            })
            .await
        {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    /// Returns a loaned resource to the warehouse.
    ///
    /// Terminal simplification: no snapshot is captured. Returning a
    /// resource to an interrupted prior state goes through the restoration
    /// engine instead.
    #[instrument(skip(self, ctx))]
    pub async fn return_to_warehouse(
        &self,
        resource_id: Uuid,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;

        if current != ResourceStatus::OnLoan {
            return Err(ServiceError::InvalidState(format!(
                "Resource {} is not on loan (current status: {})",
                res.code, current
            )));
        }

        let previous_custodian = res.custodian_id;

        let mut active: resource::ActiveModel = res.into();
        active.custodian_id = Set(None);
        active.status = Set(ResourceStatus::Available.as_str().to_string());
        active.assigned_at = Set(None);
        active.location = Set(Some(WAREHOUSE_LOCATION.to_string()));
        active.update(&txn).await?;

        let movement = ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(current),
                new_status: Some(ResourceStatus::Available),
                custodian_id: previous_custodian,
                causal_ref: ctx.causal_ref,
                actor_id: ctx.actor_id,
                note: ctx.note,
                cost: ctx.cost,
                ..MovementDraft::new(resource_id, MovementType::Return)
            },
        )
        .await?;

        txn.commit().await?;

        if let Err(e) = self.event_sender.send(Event::ResourceReturned(resource_id)).await {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    /// Sends a resource to repair from any state except `InRepair` itself.
    ///
    /// The full current state is snapshotted so completing the repair can
    /// restore it. Custody bookkeeping (`custodian_id`, `assigned_at`) is
    /// not released by a repair.
    #[instrument(skip(self, ctx))]
    pub async fn send_to_repair(
        &self,
        resource_id: Uuid,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;

        if current == ResourceStatus::InRepair {
            return Err(ServiceError::InvalidState(format!(
                "Resource {} is already in repair",
                res.code
            )));
        }

        let snapshot = Snapshot::capture(&res);
        let custodian_id = res.custodian_id;

        let mut active: resource::ActiveModel = res.into();
        active.status = Set(ResourceStatus::InRepair.as_str().to_string());
        active.location = Set(Some(REPAIR_LOCATION.to_string()));
        active.update(&txn).await?;

        let movement = ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(current),
                new_status: Some(ResourceStatus::InRepair),
                custodian_id,
                snapshot: Some(snapshot),
                causal_ref: ctx.causal_ref,
                actor_id: ctx.actor_id,
                note: ctx.note,
                cost: ctx.cost,
                ..MovementDraft::new(resource_id, MovementType::Repair)
            },
        )
        .await?;

        txn.commit().await?;

        if let Err(e) = self.event_sender.send(Event::ResourceSentToRepair(resource_id)).await {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    /// Completes a repair and restores the pre-repair state.
    ///
    /// Three-tier fallback, in order: the most recent `Repair` movement's
    /// snapshot; its `previous_status` alone; the hard default of
    /// `Available` with custody cleared. The last tier is what keeps a
    /// resource with an incomplete history from being stranded in
    /// `InRepair`.
    #[instrument(skip(self, ctx))]
    pub async fn complete_repair(
        &self,
        resource_id: Uuid,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;

        if current != ResourceStatus::InRepair {
            return Err(ServiceError::InvalidState(format!(
                "Resource {} is not in repair (current status: {})",
                res.code, current
            )));
        }

        let repair_entry =
            ledger::latest_movement_of_type(&txn, resource_id, MovementType::Repair).await?;

        let maintenance_interval = res.maintenance_interval_days;
        let mut active: resource::ActiveModel = res.into();

        let restored_status = match &repair_entry {
            Some(entry) if entry.has_snapshot() => {
                let status = entry
                    .previous_status
                    .as_deref()
                    .and_then(ResourceStatus::parse)
                    .unwrap_or(ResourceStatus::Active);

                active.custodian_id = Set(entry.original_custodian_id);
                active.status = Set(status.as_str().to_string());
                active.location = Set(entry.original_location.clone());
                active.assigned_at = Set(entry.original_assigned_at);
                active.sale_date = Set(entry.original_sale_date);
                active.sale_price = Set(entry.original_sale_price);
                active.next_maintenance_due = Set(entry.original_next_maintenance_due);

                status
            }
            Some(entry) if entry.previous_status.is_some() => {
                // No custodian was recorded; put the status back and leave
                // the custody fields as they are.
                let status = entry
                    .previous_status
                    .as_deref()
                    .and_then(ResourceStatus::parse)
                    .unwrap_or(ResourceStatus::Available);

                active.status = Set(status.as_str().to_string());
                if status == ResourceStatus::Available {
                    active.custodian_id = Set(None);
                    active.location = Set(Some(WAREHOUSE_LOCATION.to_string()));
                    active.assigned_at = Set(None);
                }

                status
            }
            _ => {
                // No repair entry in the history at all.
                active.custodian_id = Set(None);
                active.status = Set(ResourceStatus::Available.as_str().to_string());
                active.location = Set(Some(WAREHOUSE_LOCATION.to_string()));
                active.assigned_at = Set(None);

                ResourceStatus::Available
            }
        };

        let updated = active.update(&txn).await?;

        // Schedule the next maintenance when an interval is configured and
        // the repair snapshot did not carry a due date.
        if updated.next_maintenance_due.is_none() {
            if let Some(days) = maintenance_interval {
                let mut reschedule: resource::ActiveModel = updated.clone().into();
                reschedule.next_maintenance_due =
                    Set(Some(Utc::now() + Duration::days(days as i64)));
                reschedule.update(&txn).await?;
            }
        }

        let movement = ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(ResourceStatus::InRepair),
                new_status: Some(restored_status),
                custodian_id: updated.custodian_id,
                causal_ref: ctx.causal_ref,
                actor_id: ctx.actor_id,
                note: ctx.note,
                cost: ctx.cost,
                ..MovementDraft::new(resource_id, MovementType::RepairComplete)
            },
        )
        .await?;

        txn.commit().await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ResourceRepairCompleted {
                resource_id,
                restored_status: restored_status.as_str().to_string(),
            })
            .await
        {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    /// Marks a resource active (sold and in service at a custodian).
    ///
    /// No status precondition: a sale supersedes whatever was happening.
    #[instrument(skip(self, ctx))]
    pub async fn activate(
        &self,
        resource_id: Uuid,
        custodian_id: Option<Uuid>,
        sale_price: Option<Decimal>,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;

        let mut active: resource::ActiveModel = res.into();
        active.status = Set(ResourceStatus::Active.as_str().to_string());
        active.sale_date = Set(Some(Utc::now()));
        if let Some(custodian) = custodian_id {
            active.custodian_id = Set(Some(custodian));
            active.location = Set(Some(custodian_location(custodian)));
        } else {
            active.location = Set(Some(ResourceStatus::Active.as_str().to_string()));
        }
        if sale_price.is_some() {
            active.sale_price = Set(sale_price);
        }
        active.update(&txn).await?;

        let movement = ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(current),
                new_status: Some(ResourceStatus::Active),
                custodian_id,
                causal_ref: ctx.causal_ref,
                actor_id: ctx.actor_id,
                note: ctx.note,
                cost: ctx.cost,
                ..MovementDraft::new(resource_id, MovementType::Activation)
            },
        )
        .await?;

        txn.commit().await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ResourceActivated {
                resource_id,
                custodian_id,
            })
            .await
        {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    /// Generic corrective transition to an explicit target status.
    ///
    /// `Available` always clears custodian, location and assignment
    /// timestamp. The movement type is chosen from the target status:
    /// `Available` logs a Return, `Active` an Activation, `OnLoan` an
    /// Assignment, anything else a Restore.
    #[instrument(skip(self, ctx))]
    pub async fn restore_to_status(
        &self,
        resource_id: Uuid,
        target: ResourceStatus,
        custodian_id: Option<Uuid>,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;
        let previous_custodian = res.custodian_id;

        let mut active: resource::ActiveModel = res.into();
        active.status = Set(target.as_str().to_string());

        if target == ResourceStatus::Available {
            active.custodian_id = Set(None);
            active.location = Set(Some(WAREHOUSE_LOCATION.to_string()));
            active.assigned_at = Set(None);
        } else if let Some(custodian) = custodian_id {
            active.custodian_id = Set(Some(custodian));
            active.location = Set(Some(custodian_location(custodian)));
        } else {
            active.custodian_id = Set(None);
            active.location = Set(Some(target.as_str().to_string()));
        }

        active.update(&txn).await?;

        let movement_type = match target {
            ResourceStatus::Available => MovementType::Return,
            ResourceStatus::Active => MovementType::Activation,
            ResourceStatus::OnLoan => MovementType::Assignment,
            _ => MovementType::Restore,
        };

        let movement = ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(current),
                new_status: Some(target),
                // Previous custodian, for traceability of who had it.
                custodian_id: previous_custodian,
                causal_ref: ctx.causal_ref,
                actor_id: ctx.actor_id,
                note: ctx.note,
                cost: ctx.cost,
                ..MovementDraft::new(resource_id, movement_type)
            },
        )
        .await?;

        txn.commit().await?;

        if let Err(e) = self
            .event_sender
            .send(Event::ResourceStatusRestored {
                resource_id,
                new_status: target.as_str().to_string(),
            })
            .await
        {
            warn!(error = %e, "failed to publish event");
        }

        Ok(movement)
    }

    /// Logs a movement without changing the resource's state, for work done
    /// in place (on-site repairs, miscellaneous annotations).
    #[instrument(skip(self, ctx))]
    pub async fn record_generic(
        &self,
        resource_id: Uuid,
        ctx: TransitionContext,
    ) -> Result<resource_movement::Model, ServiceError> {
        let _guard = self.locks.acquire(resource_id).await;
        let txn = self.db_pool.begin().await?;

        let res = ledger::require_resource(&txn, resource_id).await?;
        let current = current_status(&res)?;

        let movement = ledger::append_movement(
            &txn,
            MovementDraft {
                previous_status: Some(current),
                new_status: Some(current),
                custodian_id: res.custodian_id,
                causal_ref: ctx.causal_ref,
                actor_id: ctx.actor_id,
                note: ctx.note,
                cost: ctx.cost,
                ..MovementDraft::new(resource_id, MovementType::Generic)
            },
        )
        .await?;

        txn.commit().await?;

        Ok(movement)
    }
}

/// Parse a resource's stored status, rejecting unknown strings.
pub(crate) fn current_status(res: &resource::Model) -> Result<ResourceStatus, ServiceError> {
    res.status().ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Resource {} has unknown status '{}'",
            res.id, res.status
        ))
    })
}
