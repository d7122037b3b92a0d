use super::ArtifactSink;
use crate::Error;
use bytes::Bytes;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbErr, EntityTrait, QueryFilter,
};
use sea_query::OnConflict;
use serde_json::Value;
use specimen_common::{
    db::{Database, DatabaseErrors},
    hashing::Digests,
};
use specimen_entity::{blob, report};
use specimen_module_storage::service::{StorageBackend, StorageKey};
use std::path::Path;
use time::OffsetDateTime;
use tokio::io::AsyncRead;
use tracing::instrument;
use uuid::Uuid;

/// An artifact sink keeping the index and the reports in the database, and the blob content in a
/// storage backend.
#[derive(Clone, Debug)]
pub struct DatabaseSink<B: StorageBackend> {
    db: Database,
    storage: B,
}

impl<B: StorageBackend> DatabaseSink<B> {
    pub fn new(db: Database, storage: B) -> Self {
        Self { db, storage }
    }

    async fn find_blob(&self, sha256: &str) -> Result<Option<blob::Model>, DbErr> {
        blob::Entity::find()
            .filter(blob::Column::Sha256.eq(sha256))
            .one(&self.db)
            .await
    }

    /// Store a file from the local file system as blob.
    async fn store_file(&self, path: &Path, filename: Option<&str>) -> Result<Uuid, Error> {
        let digests = Digests::digest_file(path).await?;
        self.store_path(path, &digests.sha256_hex(), filename).await
    }

    /// Store a file, expected to have the provided digest.
    async fn store_path(
        &self,
        path: &Path,
        sha256: &str,
        filename: Option<&str>,
    ) -> Result<Uuid, Error> {
        let file = tokio::fs::File::open(path).await?;

        match self.store_blob(file, sha256, filename).await {
            Err(Error::Validation(msg)) => {
                log::warn!("Failed to store '{}': {msg}", path.display());
                Err(Error::Validation(format!("{}: {msg}", path.display())))
            }
            result => result,
        }
    }

    /// Store the sample of a file analysis, and reference it from the target.
    async fn attach_sample(&self, document: &mut Value) -> Result<(), Error> {
        if document.pointer("/info/category").and_then(Value::as_str) != Some("file") {
            return Ok(());
        }

        let Some(path) = document
            .pointer("/target/file/path")
            .and_then(Value::as_str)
            .map(ToString::to_string)
        else {
            return Ok(());
        };

        if !is_valid_file(Path::new(&path)).await {
            log::info!("Sample '{path}' is not available, not storing it");
            return Ok(());
        }

        let name = document
            .pointer("/target/file/name")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        let id = self.store_file(Path::new(&path), name.as_deref()).await?;

        if let Some(target) = document.get_mut("target").and_then(Value::as_object_mut) {
            target.insert("file_id".into(), Value::String(id.to_string()));
        }

        Ok(())
    }

    /// Store all dropped files which are still available.
    async fn attach_dropped(&self, document: &mut Value) -> Result<(), Error> {
        let Some(dropped) = document.get_mut("dropped").and_then(Value::as_array_mut) else {
            return Ok(());
        };

        for entry in dropped.iter_mut() {
            let Some(path) = entry
                .get("path")
                .and_then(Value::as_str)
                .map(ToString::to_string)
            else {
                continue;
            };

            if !is_valid_file(Path::new(&path)).await {
                log::debug!("Dropped file '{path}' is not available, skipping");
                continue;
            }

            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .map(ToString::to_string);
            let id = self.store_file(Path::new(&path), name.as_deref()).await?;

            if let Some(entry) = entry.as_object_mut() {
                entry.insert("object_id".into(), Value::String(id.to_string()));
            }
        }

        Ok(())
    }
}

impl<B: StorageBackend> ArtifactSink for DatabaseSink<B> {
    #[instrument(skip(self, content), err)]
    async fn store_blob<R>(
        &self,
        content: R,
        sha256: &str,
        filename: Option<&str>,
    ) -> Result<Uuid, Error>
    where
        R: AsyncRead + Unpin,
    {
        let key: StorageKey = sha256
            .to_lowercase()
            .parse()
            .map_err(|err| Error::Validation(format!("{err}")))?;

        if let Some(existing) = self.find_blob(key.as_str()).await? {
            log::debug!("Blob {key} already stored as {}", existing.id);
            return Ok(existing.id);
        }

        let result = self
            .storage
            .store(content)
            .await
            .map_err(|err| Error::Storage(err.into()))?;

        if result.key() != key {
            // the content stays in the storage, it might be referenced by someone else
            return Err(Error::Validation(format!(
                "digest mismatch, expected: {key}, actual: {}",
                result.key()
            )));
        }

        let entity = blob::ActiveModel {
            id: Set(Uuid::new_v4()),
            sha256: Set(key.to_string()),
            filename: Set(filename.map(ToString::to_string)),
            size: Set(result.digests.size as i64),
            stored: Set(OffsetDateTime::now_utc()),
        };

        match entity.insert(&self.db).await {
            Ok(model) => Ok(model.id),
            Err(err) if err.is_duplicate() => {
                // stored concurrently, the content is the same
                self.find_blob(key.as_str())
                    .await?
                    .map(|existing| existing.id)
                    .ok_or_else(|| Error::Persistence(DbErr::RecordNotFound(format!("blob {key}"))))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, document), err)]
    async fn persist_report(&self, task_id: i32, document: &Value) -> Result<(), Error> {
        let mut document = document.clone();

        self.attach_sample(&mut document).await?;
        self.attach_dropped(&mut document).await?;

        let entity = report::ActiveModel {
            task_id: Set(task_id),
            document: Set(document),
            stored: Set(OffsetDateTime::now_utc()),
        };

        report::Entity::insert(entity)
            .on_conflict(
                OnConflict::column(report::Column::TaskId)
                    .update_columns([report::Column::Document, report::Column::Stored])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        log::info!("Stored report of task {task_id}");

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn fetch_blob(&self, id: Uuid) -> Result<Option<Bytes>, Error> {
        let Some(blob) = blob::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let key: StorageKey = blob
            .sha256
            .parse()
            .map_err(|err| Error::Storage(anyhow::Error::new(err)))?;

        self.storage
            .retrieve_buf(key)
            .await
            .map_err(|err| Error::Storage(err.into()))
    }

    #[instrument(skip(self), err)]
    async fn load_report(&self, task_id: i32) -> Result<Option<Value>, Error> {
        Ok(report::Entity::find_by_id(task_id)
            .one(&self.db)
            .await?
            .map(|report| report.document))
    }
}

/// A file we can store: exists, is a regular file, and is not empty.
async fn is_valid_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use specimen_test_context::SpecimenContext;
    use test_context::test_context;
    use test_log::test;

    /// A file changing between hashing and storing must name the file.
    #[test_context(SpecimenContext)]
    #[test(tokio::test)]
    async fn changed_file(ctx: &SpecimenContext) -> Result<(), anyhow::Error> {
        let sink = DatabaseSink::new(ctx.db.clone(), ctx.storage.clone());

        let path = ctx.write_file("sample.exe", b"Hello World").await?;
        let before = Digests::digest_file(&path).await?.sha256_hex();
        tokio::fs::write(&path, b"Hello Mars").await?;

        let result = sink.store_path(&path, &before, None).await;
        let Err(Error::Validation(msg)) = result else {
            panic!("must fail validation: {result:?}");
        };
        assert!(msg.contains(&path.display().to_string()), "{msg}");

        assert!(sink.find_blob(&before).await?.is_none());

        Ok(())
    }
}
