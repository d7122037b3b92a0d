use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sample::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sample::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sample::FileSize).big_integer().not_null())
                    .col(ColumnDef::new(Sample::FileType).string().not_null())
                    .col(ColumnDef::new(Sample::Md5).string_len(32).not_null())
                    .col(ColumnDef::new(Sample::Crc32).string_len(8).not_null())
                    .col(ColumnDef::new(Sample::Sha1).string_len(40).not_null())
                    .col(ColumnDef::new(Sample::Sha256).string_len(64).not_null())
                    .col(ColumnDef::new(Sample::Sha512).string_len(128).not_null())
                    .col(ColumnDef::new(Sample::Ssdeep).string())
                    .to_owned(),
            )
            .await?;

        // the combination of all digests identifies the content of a sample
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(Indexes::SampleHashIndex.to_string())
                    .table(Sample::Table)
                    .col(Sample::Md5)
                    .col(Sample::Crc32)
                    .col(Sample::Sha1)
                    .col(Sample::Sha256)
                    .col(Sample::Sha512)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Tag::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tag::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tag::Name).string().not_null().unique_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Task::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Task::Target).text().not_null())
                    .col(ColumnDef::new(Task::Category).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Task::Timeout)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Task::Priority)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Task::Custom).string())
                    .col(ColumnDef::new(Task::Package).string())
                    .col(ColumnDef::new(Task::Options).string())
                    .col(ColumnDef::new(Task::Platform).string())
                    .col(
                        ColumnDef::new(Task::Memory)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Task::EnforceTimeout)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Task::Clock)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Task::AddedOn)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Task::StartedOn).timestamp_with_time_zone())
                    .col(ColumnDef::new(Task::CompletedOn).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Task::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Task::SampleId).integer())
                    .foreign_key(
                        ForeignKey::create()
                            .from(Task::Table, Task::SampleId)
                            .to(Sample::Table, Sample::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // claiming scans the pending tasks by priority and age
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(Indexes::TaskClaimIndex.to_string())
                    .table(Task::Table)
                    .col(Task::Status)
                    .col(Task::Priority)
                    .col(Task::AddedOn)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaskError::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskError::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskError::TaskId).integer().not_null())
                    .col(ColumnDef::new(TaskError::Message).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .from(TaskError::Table, TaskError::TaskId)
                            .to(Task::Table, Task::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TaskTag::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TaskTag::TaskId).integer().not_null())
                    .col(ColumnDef::new(TaskTag::TagId).integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(TaskTag::TaskId)
                            .col(TaskTag::TagId)
                            .primary(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(TaskTag::Table, TaskTag::TaskId)
                            .to(Task::Table, Task::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(TaskTag::Table, TaskTag::TagId)
                            .to(Tag::Table, Tag::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskTag::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TaskError::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Task::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tag::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sample::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Indexes {
    SampleHashIndex,
    TaskClaimIndex,
}

#[derive(DeriveIden)]
enum Sample {
    Table,
    Id,
    FileSize,
    FileType,
    Md5,
    Crc32,
    Sha1,
    Sha256,
    Sha512,
    Ssdeep,
}

#[derive(DeriveIden)]
enum Tag {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum Task {
    Table,
    Id,
    Target,
    Category,
    Timeout,
    Priority,
    Custom,
    Package,
    Options,
    Platform,
    Memory,
    EnforceTimeout,
    Clock,
    AddedOn,
    StartedOn,
    CompletedOn,
    Status,
    SampleId,
}

#[derive(DeriveIden)]
enum TaskError {
    Table,
    Id,
    TaskId,
    Message,
}

#[derive(DeriveIden)]
enum TaskTag {
    Table,
    TaskId,
    TagId,
}
