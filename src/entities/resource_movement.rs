use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Kinds of ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Assignment,
    Return,
    Repair,
    RepairComplete,
    Activation,
    Restore,
    Generic,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Assignment => "assignment",
            MovementType::Return => "return",
            MovementType::Repair => "repair",
            MovementType::RepairComplete => "repair_complete",
            MovementType::Activation => "activation",
            MovementType::Restore => "restore",
            MovementType::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::from_str(s).ok()
    }
}

/// The higher-level business record that triggered a transition.
///
/// Tagged at movement creation; restoration scopes its work by this value
/// and applies a per-kind cleanup policy (tickets retain their movements,
/// field reports purge them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CausalRef {
    Ticket(Uuid),
    FieldReport(Uuid),
}

impl CausalRef {
    pub fn kind(&self) -> &'static str {
        match self {
            CausalRef::Ticket(_) => "ticket",
            CausalRef::FieldReport(_) => "field_report",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            CausalRef::Ticket(id) | CausalRef::FieldReport(id) => *id,
        }
    }

    pub fn from_parts(kind: Option<&str>, id: Option<Uuid>) -> Option<Self> {
        match (kind, id) {
            (Some("ticket"), Some(id)) => Some(CausalRef::Ticket(id)),
            (Some("field_report"), Some(id)) => Some(CausalRef::FieldReport(id)),
            _ => None,
        }
    }
}

/// One immutable, append-only ledger entry recording a single transition.
///
/// The `original_*` columns are a full copy of the resource's state
/// immediately before the transition, populated whenever the transition may
/// later need to be undone. Corrections are always a new row, never an edit.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resource_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub resource_id: Uuid,
    pub movement_type: String,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    pub custodian_id: Option<Uuid>,
    pub original_custodian_id: Option<Uuid>,
    pub original_location: Option<String>,
    pub original_assigned_at: Option<DateTime<Utc>>,
    pub original_sale_date: Option<DateTime<Utc>>,
    pub original_sale_price: Option<Decimal>,
    pub original_next_maintenance_due: Option<DateTime<Utc>>,
    pub causal_ref_type: Option<String>,
    pub causal_ref_id: Option<Uuid>,
    pub is_substitute_loan: bool,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
    pub cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn movement_type(&self) -> Option<MovementType> {
        MovementType::parse(&self.movement_type)
    }

    pub fn causal_ref(&self) -> Option<CausalRef> {
        CausalRef::from_parts(self.causal_ref_type.as_deref(), self.causal_ref_id)
    }

    /// Whether this entry captured the full pre-transition snapshot.
    /// A recorded original custodian is the marker; snapshot-less entries
    /// restore through `previous_status` instead.
    pub fn has_snapshot(&self) -> bool {
        self.original_custodian_id.is_some()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::resource::Entity",
        from = "Column::ResourceId",
        to = "super::resource::Column::Id"
    )]
    Resource,
}

impl Related<super::resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Resource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
