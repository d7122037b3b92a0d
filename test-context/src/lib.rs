#![allow(clippy::expect_used)]

use specimen_common::{config, db::Database};
use specimen_module_storage::service::fs::FileSystemBackend;
use std::{env, path::PathBuf};
use tempfile::{tempdir, TempDir};
use test_context::AsyncTestContext;
use tracing::instrument;

/// A migrated database plus a file system storage, both scoped to a single test.
#[allow(dead_code)]
pub struct SpecimenContext {
    pub db: Database,
    pub storage: FileSystemBackend,
    /// scratch space for sample files
    pub tempdir: TempDir,
    storage_dir: TempDir,
    db_dir: Option<TempDir>,
}

impl SpecimenContext {
    async fn new(db: Database, db_dir: impl Into<Option<TempDir>>) -> Self {
        let (storage, storage_dir) = FileSystemBackend::for_test()
            .await
            .expect("initializing the storage backend");
        let tempdir = tempdir().expect("creating a scratch directory");

        Self {
            db,
            storage,
            tempdir,
            storage_dir,
            db_dir: db_dir.into(),
        }
    }

    /// Write a file into the scratch directory, returning its path.
    pub async fn write_file(
        &self,
        name: &str,
        content: impl AsRef<[u8]>,
    ) -> Result<PathBuf, anyhow::Error> {
        let path = self.tempdir.path().join(name);
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }
}

impl AsyncTestContext for SpecimenContext {
    #[instrument]
    #[allow(clippy::expect_used)]
    async fn setup() -> SpecimenContext {
        if env::var("EXTERNAL_TEST_DB").is_ok() {
            log::warn!("Using external database from 'SPECIMEN_DB_*' env vars");
            let config = config::Database::from_env().expect("DB config from env");
            let db = Database::new(&config)
                .await
                .expect("Configuring the database");
            db.refresh().await.expect("Resetting the database schema");

            return SpecimenContext::new(db, None).await;
        }

        let dir = tempdir().expect("creating the database directory");
        let config = config::Database {
            // a single connection, so that writers never run into a locked database file
            max_conn: 1,
            ..config::Database::sqlite(dir.path().join("specimen.db").display())
                .expect("SQLite configuration")
        };

        let db = Database::new(&config)
            .await
            .expect("Create a SQLite database");
        db.migrate().await.expect("Migrating the database");

        SpecimenContext::new(db, dir).await
    }

    async fn teardown(self) {
        if let Err(err) = self.db.close().await {
            log::warn!("Failed to close the database: {err}");
        }
    }
}
