use super::{task_category::Category, task_status::Status};
use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "task")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_type = "Text")]
    pub target: String,
    pub category: Category,
    /// analysis timeout in seconds, `0` meaning the package default
    pub timeout: i32,
    pub priority: i32,
    pub custom: Option<String>,
    pub package: Option<String>,
    pub options: Option<String>,
    pub platform: Option<String>,
    pub memory: bool,
    pub enforce_timeout: bool,
    /// the wall clock the analysis environment should pretend
    pub clock: OffsetDateTime,
    pub added_on: OffsetDateTime,
    pub started_on: Option<OffsetDateTime>,
    pub completed_on: Option<OffsetDateTime>,
    pub status: Status,
    pub sample_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::sample::Entity",
        from = "Column::SampleId",
        to = "super::sample::Column::Id"
    )]
    Sample,
    #[sea_orm(has_many = "super::task_error::Entity")]
    TaskError,
    #[sea_orm(has_many = "super::task_tag::Entity")]
    TaskTag,
}

impl Related<super::sample::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sample.def()
    }
}

impl Related<super::task_error::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskError.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        super::task_tag::Relation::Tag.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::task_tag::Relation::Task.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
