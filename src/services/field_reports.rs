//! Field report adapter.
//!
//! A field report batches the equipment operations a technician performed on
//! site. Applying a report drives the state machine once per operation, all
//! tagged with the report's causal reference; deleting a report restores the
//! affected resources and then purges its movements entirely.

use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        field_report::{self, Entity as FieldReport},
        resource::ResourceStatus,
        resource_movement::CausalRef,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        resource_lifecycle::ResourceLifecycleService,
        restoration::{RestorationReport, RestorationService},
        TransitionContext,
    },
};

/// One equipment operation recorded on a field report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EquipmentOperation {
    /// Loan the unit to the report's custodian, interrupting an active
    /// placement if necessary.
    Loan {
        resource_id: Uuid,
        #[serde(default)]
        note: Option<String>,
    },
    /// Loan substitute equipment while the custodian's own unit is away.
    SubstituteLoan {
        resource_id: Uuid,
        #[serde(default)]
        note: Option<String>,
    },
    /// Take the unit away for repair.
    PickupForRepair {
        resource_id: Uuid,
        #[serde(default)]
        note: Option<String>,
    },
    /// Repair performed in place; logged, no state change.
    OnSiteRepair {
        resource_id: Uuid,
        #[serde(default)]
        note: Option<String>,
    },
    /// Bring a repaired unit back and restore its pre-repair state.
    DeliverRepaired {
        resource_id: Uuid,
        #[serde(default)]
        note: Option<String>,
    },
    /// Collect a loaned unit back into the warehouse.
    ReturnFromLoan {
        resource_id: Uuid,
        #[serde(default)]
        note: Option<String>,
    },
    /// Anything else worth a ledger entry.
    Other {
        resource_id: Uuid,
        #[serde(default)]
        note: Option<String>,
    },
}

impl EquipmentOperation {
    pub fn resource_id(&self) -> Uuid {
        match self {
            EquipmentOperation::Loan { resource_id, .. }
            | EquipmentOperation::SubstituteLoan { resource_id, .. }
            | EquipmentOperation::PickupForRepair { resource_id, .. }
            | EquipmentOperation::OnSiteRepair { resource_id, .. }
            | EquipmentOperation::DeliverRepaired { resource_id, .. }
            | EquipmentOperation::ReturnFromLoan { resource_id, .. }
            | EquipmentOperation::Other { resource_id, .. } => *resource_id,
        }
    }

    fn note(&self) -> Option<&str> {
        match self {
            EquipmentOperation::Loan { note, .. }
            | EquipmentOperation::SubstituteLoan { note, .. }
            | EquipmentOperation::PickupForRepair { note, .. }
            | EquipmentOperation::OnSiteRepair { note, .. }
            | EquipmentOperation::DeliverRepaired { note, .. }
            | EquipmentOperation::ReturnFromLoan { note, .. }
            | EquipmentOperation::Other { note, .. } => note.as_deref(),
        }
    }
}

/// Result of applying a batch of operations. Failures are collected, not
/// fatal: a technician's report is applied as far as it can be.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportApplication {
    pub applied: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct FieldReportService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    lifecycle: ResourceLifecycleService,
    restoration: RestorationService,
}

impl FieldReportService {
    /// Creates a new field report service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        lifecycle: ResourceLifecycleService,
        restoration: RestorationService,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            lifecycle,
            restoration,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_report(
        &self,
        number: String,
        ticket_id: Option<Uuid>,
        custodian_id: Option<Uuid>,
    ) -> Result<field_report::Model, ServiceError> {
        if number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Report number cannot be empty".to_string(),
            ));
        }

        let model = field_report::ActiveModel {
            id: Set(Uuid::new_v4()),
            number: Set(number),
            ticket_id: Set(ticket_id),
            custodian_id: Set(custodian_id),
            status: Set("open".to_string()),
            ..Default::default()
        };

        Ok(model.insert(self.db_pool.as_ref()).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_report(&self, report_id: Uuid) -> Result<field_report::Model, ServiceError> {
        FieldReport::find_by_id(report_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Field report {} not found", report_id)))
    }

    /// Applies a batch of equipment operations on behalf of a report.
    ///
    /// Each operation drives one state-machine transition tagged with the
    /// report's reference. Operations that do not apply to the resource's
    /// current state (picking up a unit already in repair, returning one not
    /// on loan) are skipped; hard failures are collected per operation and
    /// the batch continues.
    #[instrument(skip(self, operations, actor_id))]
    pub async fn apply_operations(
        &self,
        report_id: Uuid,
        operations: Vec<EquipmentOperation>,
        actor_id: Option<Uuid>,
    ) -> Result<ReportApplication, ServiceError> {
        let report = self.get_report(report_id).await?;
        let causal_ref = CausalRef::FieldReport(report.id);

        let mut outcome = ReportApplication::default();

        for op in operations {
            let resource_id = op.resource_id();
            let mut ctx = TransitionContext::new(actor_id).with_causal_ref(causal_ref);
            if let Some(note) = op.note() {
                ctx = ctx.with_note(note);
            }

            let result = self.apply_one(&report, &op, ctx).await;

            match result {
                Ok(true) => outcome.applied += 1,
                Ok(false) => {
                    debug!(%resource_id, ?op, "operation skipped, state already matches");
                    outcome.skipped += 1;
                }
                Err(err) => {
                    warn!(%resource_id, error = %err, "report operation failed");
                    outcome
                        .errors
                        .push(format!("resource {}: {}", resource_id, err));
                }
            }
        }

        info!(
            %report_id,
            applied = outcome.applied,
            skipped = outcome.skipped,
            failed = outcome.errors.len(),
            "field report operations applied"
        );

        Ok(outcome)
    }

    /// Dispatch one operation. `Ok(true)` means a transition ran, `Ok(false)`
    /// that the operation was a no-op for the resource's current state.
    async fn apply_one(
        &self,
        report: &field_report::Model,
        op: &EquipmentOperation,
        ctx: TransitionContext,
    ) -> Result<bool, ServiceError> {
        let resource_id = op.resource_id();

        match op {
            EquipmentOperation::Loan { .. } => {
                let custodian = self.report_custodian(report)?;
                self.lifecycle
                    .loan_temporarily(resource_id, custodian, ctx)
                    .await?;
                Ok(true)
            }
            EquipmentOperation::SubstituteLoan { .. } => {
                let custodian = self.report_custodian(report)?;
                self.lifecycle
                    .loan_substitute(resource_id, custodian, ctx)
                    .await?;
                Ok(true)
            }
            EquipmentOperation::PickupForRepair { .. } => {
                let res = self.lifecycle.get_resource(resource_id).await?;
                if res.status() == Some(ResourceStatus::InRepair) {
                    return Ok(false);
                }
                self.lifecycle.send_to_repair(resource_id, ctx).await?;
                Ok(true)
            }
            EquipmentOperation::OnSiteRepair { .. } => {
                let ctx = if ctx.note.is_some() {
                    ctx
                } else {
                    ctx.with_note("On-site repair")
                };
                self.lifecycle.record_generic(resource_id, ctx).await?;
                Ok(true)
            }
            EquipmentOperation::DeliverRepaired { .. } => {
                let res = self.lifecycle.get_resource(resource_id).await?;
                if res.status() != Some(ResourceStatus::InRepair) {
                    return Ok(false);
                }
                self.lifecycle.complete_repair(resource_id, ctx).await?;
                Ok(true)
            }
            EquipmentOperation::ReturnFromLoan { .. } => {
                let res = self.lifecycle.get_resource(resource_id).await?;
                if res.status() != Some(ResourceStatus::OnLoan) {
                    return Ok(false);
                }
                self.lifecycle.return_to_warehouse(resource_id, ctx).await?;
                Ok(true)
            }
            EquipmentOperation::Other { .. } => {
                self.lifecycle.record_generic(resource_id, ctx).await?;
                Ok(true)
            }
        }
    }

    /// Deletes a report: restores every resource it moved, purges its
    /// movements, then removes the row.
    #[instrument(skip(self))]
    pub async fn delete_report(
        &self,
        report_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<RestorationReport, ServiceError> {
        let report = self.get_report(report_id).await?;

        let ctx = TransitionContext::new(actor_id)
            .with_note(format!("Restored on deletion of report {}", report.number));
        let restoration = self
            .restoration
            .restore_by_causal_ref(CausalRef::FieldReport(report_id), ctx)
            .await?;

        FieldReport::delete_by_id(report_id)
            .exec(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::DatabaseError)?;

        info!(
            %report_id,
            restored = restoration.restored,
            skipped = restoration.skipped,
            failed = restoration.failed,
            "field report deleted"
        );

        if let Err(e) = self.event_sender.send(Event::FieldReportDeleted(report_id)).await {
            warn!(error = %e, "failed to publish event");
        }

        Ok(restoration)
    }

    fn report_custodian(&self, report: &field_report::Model) -> Result<Uuid, ServiceError> {
        report.custodian_id.ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Report {} has no custodian; loan operations need one",
                report.number
            ))
        })
    }
}
