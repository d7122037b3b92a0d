pub mod blob;
pub mod report;
pub mod sample;
pub mod tag;
pub mod task;
pub mod task_category;
pub mod task_error;
pub mod task_status;
pub mod task_tag;
