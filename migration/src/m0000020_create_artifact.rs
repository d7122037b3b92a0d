use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Blob::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Blob::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Blob::Sha256)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Blob::Filename).string())
                    .col(ColumnDef::new(Blob::Size).big_integer().not_null())
                    .col(
                        ColumnDef::new(Blob::Stored)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Report::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Report::TaskId)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Report::Document).json_binary().not_null())
                    .col(
                        ColumnDef::new(Report::Stored)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Report::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Blob::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Blob {
    Table,
    Id,
    Sha256,
    Filename,
    Size,
    Stored,
}

#[derive(DeriveIden)]
enum Report {
    Table,
    TaskId,
    Document,
    Stored,
}
