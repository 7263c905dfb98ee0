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
                    .table(FundUnlockRequests::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FundUnlockRequests::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FundUnlockRequests::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(FundUnlockRequests::MilestoneId).uuid().not_null())
                    .col(ColumnDef::new(FundUnlockRequests::ArtistId).string().not_null())
                    .col(
                        ColumnDef::new(FundUnlockRequests::RequestedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(FundUnlockRequests::Status).string().not_null())
                    .col(
                        ColumnDef::new(FundUnlockRequests::RespondedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(FundUnlockRequests::AdminId).string().null())
                    .col(ColumnDef::new(FundUnlockRequests::AdminResponse).text().null())
                    .col(ColumnDef::new(FundUnlockRequests::EscrowReceipt).string().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_unlock_requests_project")
                            .from(FundUnlockRequests::Table, FundUnlockRequests::ProjectId)
                            .to(Projects::Table, Projects::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_unlock_requests_milestone")
                            .from(FundUnlockRequests::Table, FundUnlockRequests::MilestoneId)
                            .to(Milestones::Table, Milestones::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Backstop for the single-pending rule; partial indexes are not
        // expressible through the index builder, so this goes in as raw SQL.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_unlock_requests_one_pending \
                 ON fund_unlock_requests (project_id) WHERE status = 'pending'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FundUnlockRequests::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FundUnlockRequests {
    Table,
    Id,
    ProjectId,
    MilestoneId,
    ArtistId,
    RequestedAt,
    Status,
    RespondedAt,
    AdminId,
    AdminResponse,
    EscrowReceipt,
}
