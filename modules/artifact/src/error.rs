use sea_orm::DbErr;
use specimen_common::db::DatabaseErrors;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("artifact sink unavailable: {0}")]
    SinkUnavailable(#[source] DbErr),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(anyhow::Error),
    #[error("persistence error: {0}")]
    Persistence(#[source] DbErr),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<DbErr> for Error {
    fn from(value: DbErr) -> Self {
        if value.is_unavailable() {
            Self::SinkUnavailable(value)
        } else {
            Self::Persistence(value)
        }
    }
}
