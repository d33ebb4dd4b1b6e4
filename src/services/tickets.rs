//! Service ticket adapter.
//!
//! Tickets are the first of the two collaborator records that drive the
//! lifecycle engine. Closing a ticket restores every resource its movements
//! touched; the movements themselves are retained as audit history.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        resource_movement::CausalRef,
        ticket::{self, Entity as Ticket, TicketStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        restoration::{RestorationReport, RestorationService},
        TransitionContext,
    },
};

/// Service for the ticket endpoints and the close-triggers-restoration rule.
#[derive(Clone)]
pub struct TicketService {
    db_pool: Arc<DbPool>,
    event_sender: EventSender,
    restoration: RestorationService,
}

impl TicketService {
    /// Creates a new ticket service instance
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: EventSender,
        restoration: RestorationService,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            restoration,
        }
    }

    #[instrument(skip(self))]
    pub async fn create_ticket(
        &self,
        number: String,
        subject: String,
        custodian_id: Option<Uuid>,
    ) -> Result<ticket::Model, ServiceError> {
        if number.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Ticket number cannot be empty".to_string(),
            ));
        }

        let model = ticket::ActiveModel {
            id: Set(Uuid::new_v4()),
            number: Set(number),
            subject: Set(subject),
            status: Set(TicketStatus::Open.as_str().to_string()),
            custodian_id: Set(custodian_id),
            closed_at: Set(None),
            ..Default::default()
        };

        let created = model.insert(self.db_pool.as_ref()).await?;

        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_ticket(&self, ticket_id: Uuid) -> Result<ticket::Model, ServiceError> {
        Ticket::find_by_id(ticket_id)
            .one(self.db_pool.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Ticket {} not found", ticket_id)))
    }

    /// Closes a ticket and restores every resource it moved.
    ///
    /// The status change commits first; restoration runs once, synchronously,
    /// and is idempotent, so a retried close after a partial failure only
    /// picks up the resources still pending.
    #[instrument(skip(self))]
    pub async fn close_ticket(
        &self,
        ticket_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<(ticket::Model, RestorationReport), ServiceError> {
        let existing = self.get_ticket(ticket_id).await?;

        if existing.status == TicketStatus::Closed.as_str() {
            return Err(ServiceError::InvalidState(format!(
                "Ticket {} is already closed",
                existing.number
            )));
        }

        let number = existing.number.clone();

        let mut active: ticket::ActiveModel = existing.into();
        active.status = Set(TicketStatus::Closed.as_str().to_string());
        active.closed_at = Set(Some(Utc::now()));
        let closed = active.update(self.db_pool.as_ref()).await?;

        let ctx = TransitionContext::new(actor_id)
            .with_note(format!("Restored on closure of ticket {}", number));
        let report = self
            .restoration
            .restore_by_causal_ref(CausalRef::Ticket(ticket_id), ctx)
            .await?;

        info!(
            %ticket_id,
            restored = report.restored,
            skipped = report.skipped,
            failed = report.failed,
            "ticket closed"
        );

        if let Err(e) = self.event_sender.send(Event::TicketClosed(ticket_id)).await {
            warn!(error = %e, "failed to publish event");
        }

        Ok((closed, report))
    }

    /// Reopens a closed ticket. The earlier restoration is not undone; any
    /// new movements the reopened ticket causes will be restored again on
    /// the next close.
    #[instrument(skip(self))]
    pub async fn reopen_ticket(&self, ticket_id: Uuid) -> Result<ticket::Model, ServiceError> {
        let existing = self.get_ticket(ticket_id).await?;

        if existing.status != TicketStatus::Closed.as_str() {
            return Err(ServiceError::InvalidState(format!(
                "Ticket {} is not closed",
                existing.number
            )));
        }

        let mut active: ticket::ActiveModel = existing.into();
        active.status = Set(TicketStatus::Open.as_str().to_string());
        active.closed_at = Set(None);

        Ok(active.update(self.db_pool.as_ref()).await?)
    }
}
