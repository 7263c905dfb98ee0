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
                    .table(Milestones::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Milestones::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Milestones::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(Milestones::Position).integer().not_null())
                    .col(ColumnDef::new(Milestones::Name).string().not_null())
                    .col(ColumnDef::new(Milestones::Description).text().not_null())
                    .col(ColumnDef::new(Milestones::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Milestones::Status).string().not_null())
                    .col(ColumnDef::new(Milestones::ReleasedAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(Milestones::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_milestones_project")
                            .from(Milestones::Table, Milestones::ProjectId)
                            .to(Projects::Table, Projects::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_milestones_project_position")
                    .table(Milestones::Table)
                    .col(Milestones::ProjectId)
                    .col(Milestones::Position)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Milestones::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Milestones {
    Table,
    Id,
    ProjectId,
    Position,
    Name,
    Description,
    Amount,
    Status,
    ReleasedAt,
    CreatedAt,
}
