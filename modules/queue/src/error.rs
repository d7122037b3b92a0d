use sea_orm::DbErr;
use specimen_common::db::DatabaseErrors;
use specimen_entity::task_status::Status;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task {0} not found")]
    NotFound(i32),
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] DbErr),
    #[error("persistence error: {0}")]
    Persistence(#[source] DbErr),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<DbErr> for Error {
    fn from(value: DbErr) -> Self {
        if value.is_unavailable() {
            Self::StoreUnavailable(value)
        } else {
            Self::Persistence(value)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use sea_orm::ConnAcquireErr;

    #[test]
    fn classify() {
        assert!(matches!(
            Error::from(DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)),
            Error::StoreUnavailable(_)
        ));
        assert!(matches!(
            Error::from(DbErr::RecordNotInserted),
            Error::Persistence(_)
        ));
    }
}
