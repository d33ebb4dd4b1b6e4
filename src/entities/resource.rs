use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{entity::prelude::*, ActiveValue::Set};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle states of a serialized resource.
///
/// `Available` is the canonical empty state: no custodian, no assignment
/// timestamp. Every other state is entered through a logged movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Available,
    OnLoan,
    InRepair,
    Active,
    Decommissioned,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Available => "available",
            ResourceStatus::OnLoan => "on_loan",
            ResourceStatus::InRepair => "in_repair",
            ResourceStatus::Active => "active",
            ResourceStatus::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::from_str(s).ok()
    }
}

/// A serialized physical unit whose custody and condition are tracked.
///
/// Current-state snapshot, one row per unit. All mutations happen as the
/// side effect of an appended `resource_movement` row, inside the same
/// transaction.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "resources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub status: String,
    pub custodian_id: Option<Uuid>,
    pub location: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub sale_date: Option<DateTime<Utc>>,
    pub sale_price: Option<Decimal>,
    pub next_maintenance_due: Option<DateTime<Utc>>,
    pub maintenance_interval_days: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn status(&self) -> Option<ResourceStatus> {
        ResourceStatus::parse(&self.status)
    }

    pub fn is_available(&self) -> bool {
        self.status == ResourceStatus::Available.as_str()
    }

    pub fn is_in_repair(&self) -> bool {
        self.status == ResourceStatus::InRepair.as_str()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::resource_movement::Entity")]
    Movements,
}

impl Related<super::resource_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Movements.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        let now = Utc::now();

        if insert {
            active_model.created_at = Set(now);
        }

        active_model.updated_at = Set(Some(now));

        Ok(active_model)
    }
}
