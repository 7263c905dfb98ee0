use sea_orm_migration::prelude::*;

use super::m20250601_101500_create_projects_table::Projects;
use super::m20250601_101600_create_milestones_table::Milestones;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MilestoneProofs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MilestoneProofs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(MilestoneProofs::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(MilestoneProofs::MilestoneId).uuid().not_null())
                    .col(ColumnDef::new(MilestoneProofs::Description).text().not_null())
                    .col(ColumnDef::new(MilestoneProofs::FileRef).string().not_null())
                    .col(ColumnDef::new(MilestoneProofs::Status).string().not_null())
                    .col(ColumnDef::new(MilestoneProofs::AdminId).string().null())
                    .col(ColumnDef::new(MilestoneProofs::AdminResponse).text().null())
                    .col(
                        ColumnDef::new(MilestoneProofs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(MilestoneProofs::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_milestone_proofs_project")
                            .from(MilestoneProofs::Table, MilestoneProofs::ProjectId)
                            .to(Projects::Table, Projects::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_milestone_proofs_milestone")
                            .from(MilestoneProofs::Table, MilestoneProofs::MilestoneId)
                            .to(Milestones::Table, Milestones::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MilestoneProofs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MilestoneProofs {
    Table,
    Id,
    ProjectId,
    MilestoneId,
    Description,
    FileRef,
    Status,
    AdminId,
    AdminResponse,
    CreatedAt,
    ReviewedAt,
}
