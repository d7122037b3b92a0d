mod sample;
mod tag;
mod task;

pub use sample::SampleService;
pub use tag::{split_labels, TagService};
pub use task::TaskService;

use sea_orm::DbErr;
use std::fmt::Display;

/// Turn a failed read into an empty result, logging the cause.
fn or_empty<T: Default>(result: Result<T, DbErr>, context: impl Display) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            log::warn!("Failed to {context}: {err}");
            T::default()
        }
    }
}
