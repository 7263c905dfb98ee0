use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Project lifecycle, stored as a lowercase string.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "projects")]
#[schema(as = Project)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Owning artist
    pub artist_id: String,
    pub title: String,
    /// Funding goal in minor currency units
    pub funding_goal: i64,
    /// Running ledger aggregate (active minus cancelled), minor units
    pub raised: i64,
    pub status: ProjectStatus,
    /// Compare-and-set counter for the project aggregate
    #[serde(skip_serializing)]
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::milestone::Entity")]
    Milestone,
    #[sea_orm(has_many = "super::investment::Entity")]
    Investment,
    #[sea_orm(has_many = "super::fund_unlock_request::Entity")]
    FundUnlockRequest,
    #[sea_orm(has_many = "super::milestone_proof::Entity")]
    MilestoneProof,
}

impl Related<super::milestone::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Milestone.def()
    }
}

impl Related<super::investment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Investment.def()
    }
}

impl Related<super::fund_unlock_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FundUnlockRequest.def()
    }
}

impl Related<super::milestone_proof::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MilestoneProof.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
