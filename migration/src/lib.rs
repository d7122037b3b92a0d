pub use sea_orm_migration::prelude::*;

mod m0000010_create_queue;
mod m0000020_create_artifact;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m0000010_create_queue::Migration),
            Box::new(m0000020_create_artifact::Migration),
        ]
    }
}
