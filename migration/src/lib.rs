pub use sea_orm_migration::prelude::*;

mod m20250601_101500_create_projects_table;
mod m20250601_101600_create_milestones_table;
mod m20250601_101700_create_investments_table;
mod m20250601_101800_create_fund_unlock_requests_table;
mod m20250601_101900_create_milestone_proofs_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_101500_create_projects_table::Migration),
            Box::new(m20250601_101600_create_milestones_table::Migration),
            Box::new(m20250601_101700_create_investments_table::Migration),
            Box::new(m20250601_101800_create_fund_unlock_requests_table::Migration),
            Box::new(m20250601_101900_create_milestone_proofs_table::Migration),
        ]
    }
}
