//! Resource Ledger Store.
//!
//! Plain persistence boundary over the `resources` and `resource_movements`
//! tables. Owns no business logic. Every function is generic over
//! [`ConnectionTrait`] so callers can compose reads and writes into a single
//! transaction; the state machine and the restoration engine always commit a
//! resource write together with its movement as one atomic unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::{
    resource::{self, Entity as Resource, ResourceStatus},
    resource_movement::{self, CausalRef, Entity as ResourceMovement, MovementType},
};
use crate::errors::ServiceError;

/// Full copy of a resource's mutable state, captured immediately before an
/// undoable transition and written into the movement's `original_*` columns.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub custodian_id: Option<Uuid>,
    pub location: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub sale_date: Option<DateTime<Utc>>,
    pub sale_price: Option<Decimal>,
    pub next_maintenance_due: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn capture(res: &resource::Model) -> Self {
        Self {
            custodian_id: res.custodian_id,
            location: res.location.clone(),
            assigned_at: res.assigned_at,
            sale_date: res.sale_date,
            sale_price: res.sale_price,
            next_maintenance_due: res.next_maintenance_due,
        }
    }
}

/// All the data needed to append one ledger entry.
#[derive(Debug, Clone)]
pub struct MovementDraft {
    pub resource_id: Uuid,
    pub movement_type: MovementType,
    pub previous_status: Option<ResourceStatus>,
    pub new_status: Option<ResourceStatus>,
    pub custodian_id: Option<Uuid>,
    pub snapshot: Option<Snapshot>,
    pub causal_ref: Option<CausalRef>,
    pub is_substitute_loan: bool,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
    pub cost: Option<Decimal>,
}

impl MovementDraft {
    pub fn new(resource_id: Uuid, movement_type: MovementType) -> Self {
        Self {
            resource_id,
            movement_type,
            previous_status: None,
            new_status: None,
            custodian_id: None,
            snapshot: None,
            causal_ref: None,
            is_substitute_loan: false,
            actor_id: None,
            note: None,
            cost: None,
        }
    }
}

pub async fn find_resource<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<resource::Model>, ServiceError> {
    Resource::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

pub async fn require_resource<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<resource::Model, ServiceError> {
    find_resource(conn, id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Resource {} not found", id)))
}

/// Append one movement row. Movements are never updated; corrections are
/// always a new entry.
pub async fn append_movement<C: ConnectionTrait>(
    conn: &C,
    draft: MovementDraft,
) -> Result<resource_movement::Model, ServiceError> {
    let snapshot = draft.snapshot.unwrap_or_default();

    let movement = resource_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        resource_id: Set(draft.resource_id),
        movement_type: Set(draft.movement_type.as_str().to_string()),
        previous_status: Set(draft.previous_status.map(|s| s.as_str().to_string())),
        new_status: Set(draft.new_status.map(|s| s.as_str().to_string())),
        custodian_id: Set(draft.custodian_id),
        original_custodian_id: Set(snapshot.custodian_id),
        original_location: Set(snapshot.location),
        original_assigned_at: Set(snapshot.assigned_at),
        original_sale_date: Set(snapshot.sale_date),
        original_sale_price: Set(snapshot.sale_price),
        original_next_maintenance_due: Set(snapshot.next_maintenance_due),
        causal_ref_type: Set(draft.causal_ref.map(|r| r.kind().to_string())),
        causal_ref_id: Set(draft.causal_ref.map(|r| r.id())),
        is_substitute_loan: Set(draft.is_substitute_loan),
        actor_id: Set(draft.actor_id),
        note: Set(draft.note),
        cost: Set(draft.cost),
        created_at: Set(Utc::now()),
    };

    movement
        .insert(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Movement history of one resource, oldest first.
pub async fn movements_for_resource<C: ConnectionTrait>(
    conn: &C,
    resource_id: Uuid,
) -> Result<Vec<resource_movement::Model>, ServiceError> {
    ResourceMovement::find()
        .filter(resource_movement::Column::ResourceId.eq(resource_id))
        .order_by_asc(resource_movement::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Every movement a causal reference triggered, oldest first. Processing
/// order matters to the restoration engine: the oldest entry for a resource
/// defines its pre-reference state.
pub async fn movements_by_causal_ref<C: ConnectionTrait>(
    conn: &C,
    causal_ref: CausalRef,
) -> Result<Vec<resource_movement::Model>, ServiceError> {
    ResourceMovement::find()
        .filter(resource_movement::Column::CausalRefType.eq(causal_ref.kind()))
        .filter(resource_movement::Column::CausalRefId.eq(causal_ref.id()))
        .order_by_asc(resource_movement::Column::CreatedAt)
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// The single most recent movement of one type for a resource: an ordered
/// scan, newest first, limit 1.
pub async fn latest_movement_of_type<C: ConnectionTrait>(
    conn: &C,
    resource_id: Uuid,
    movement_type: MovementType,
) -> Result<Option<resource_movement::Model>, ServiceError> {
    ResourceMovement::find()
        .filter(resource_movement::Column::ResourceId.eq(resource_id))
        .filter(resource_movement::Column::MovementType.eq(movement_type.as_str()))
        .order_by_desc(resource_movement::Column::CreatedAt)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

pub async fn count_movements_for_resource<C: ConnectionTrait>(
    conn: &C,
    resource_id: Uuid,
) -> Result<u64, ServiceError> {
    ResourceMovement::find()
        .filter(resource_movement::Column::ResourceId.eq(resource_id))
        .count(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Purge every movement still referencing a causal reference. Only the
/// field-report deletion policy calls this; ledger entries are otherwise
/// immutable.
pub async fn delete_movements_by_causal_ref<C: ConnectionTrait>(
    conn: &C,
    causal_ref: CausalRef,
) -> Result<u64, ServiceError> {
    let res = ResourceMovement::delete_many()
        .filter(resource_movement::Column::CausalRefType.eq(causal_ref.kind()))
        .filter(resource_movement::Column::CausalRefId.eq(causal_ref.id()))
        .exec(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(res.rows_affected)
}
