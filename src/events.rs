use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Events emitted by the lifecycle engine after a transition commits.
///
/// Delivery is best effort: a failed send is logged, never propagated, since
/// the transition it announces has already committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    ResourceCreated(Uuid),
    ResourceAssigned {
        resource_id: Uuid,
        custodian_id: Uuid,
    },
    ResourceLoaned {
        resource_id: Uuid,
        custodian_id: Uuid,
        interrupted_active: bool,
    },
    ResourceReturned(Uuid),
    ResourceSentToRepair(Uuid),
    ResourceRepairCompleted {
        resource_id: Uuid,
        restored_status: String,
    },
    ResourceActivated {
        resource_id: Uuid,
        custodian_id: Option<Uuid>,
    },
    ResourceStatusRestored {
        resource_id: Uuid,
        new_status: String,
    },
    RestorationCompleted {
        causal_ref_kind: String,
        causal_ref_id: Uuid,
        restored: usize,
        skipped: usize,
        failed: usize,
    },
    TicketClosed(Uuid),
    FieldReportDeleted(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Consume events off the channel and log them. Runs until every sender is
/// dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");

    while let Some(event) = receiver.recv().await {
        debug!(?event, "event received");
    }

    info!("Event processor stopped");
}
