use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Index entry of a content-addressed binary object.
///
/// The content itself lives in the storage backend, keyed by its SHA-256 digest.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "blob")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub sha256: String,
    pub filename: Option<String>,
    pub size: i64,
    pub stored: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
