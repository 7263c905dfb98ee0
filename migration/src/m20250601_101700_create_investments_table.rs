use sea_orm_migration::prelude::*;

use super::m20250601_101500_create_projects_table::Projects;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Investments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Investments::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Investments::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Investments::InvestorId).string().not_null())
                    .col(ColumnDef::new(Investments::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Investments::Status).string().not_null())
                    // Set only on compensating (cancelled) entries
                    .col(ColumnDef::new(Investments::ReversesId).uuid().null().unique_key())
                    .col(
                        ColumnDef::new(Investments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_investments_project")
                            .from(Investments::Table, Investments::ProjectId)
                            .to(Projects::Table, Projects::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_investments_project")
                    .table(Investments::Table)
                    .col(Investments::ProjectId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Investments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Investments {
    Table,
    Id,
    ProjectId,
    InvestorId,
    Amount,
    Status,
    ReversesId,
    CreatedAt,
}
