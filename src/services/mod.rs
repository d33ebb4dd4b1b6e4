pub mod field_reports;
pub mod resource_lifecycle;
pub mod restoration;
pub mod tickets;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::resource_movement::CausalRef;

/// Explicit per-call context for every transition.
///
/// The acting user and the triggering business record travel with the call;
/// there is no ambient session state.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub actor_id: Option<Uuid>,
    pub causal_ref: Option<CausalRef>,
    pub note: Option<String>,
    pub cost: Option<Decimal>,
}

impl TransitionContext {
    pub fn new(actor_id: Option<Uuid>) -> Self {
        Self {
            actor_id,
            ..Default::default()
        }
    }

    pub fn with_causal_ref(mut self, causal_ref: CausalRef) -> Self {
        self.causal_ref = Some(causal_ref);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}
