mod database;

pub use database::DatabaseSink;

use crate::Error;
use bytes::Bytes;
use serde_json::Value;
use std::future::Future;
use tokio::io::AsyncRead;
use uuid::Uuid;

/// Persists the outcome of an analysis: binary artifacts and the report document.
pub trait ArtifactSink {
    /// Store a binary, returning its id.
    ///
    /// Content is deduplicated by its SHA-256 digest. Storing content which is already known
    /// returns the existing id, without reading the content. The content must match `sha256`.
    fn store_blob<R>(
        &self,
        content: R,
        sha256: &str,
        filename: Option<&str>,
    ) -> impl Future<Output = Result<Uuid, Error>>
    where
        R: AsyncRead + Unpin;

    /// Persist the report of a task, replacing any previous report of the same task.
    ///
    /// Files referenced by the report (the sample, dropped files) are stored as blobs and the
    /// stored report references them by id. The provided document is not modified.
    fn persist_report(&self, task_id: i32, document: &Value)
        -> impl Future<Output = Result<(), Error>>;

    fn fetch_blob(&self, id: Uuid) -> impl Future<Output = Result<Option<Bytes>, Error>>;

    fn load_report(&self, task_id: i32) -> impl Future<Output = Result<Option<Value>, Error>>;
}
