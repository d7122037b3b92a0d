use std::path::PathBuf;

#[derive(clap::Args, Debug, Clone)]
#[command(next_help_heading = "Storage")]
pub struct StorageConfig {
    /// Base directory of the content addressed blob storage.
    #[arg(
        id = "storage-fs-path",
        long,
        env = "SPECIMEN_STORAGE_FS_PATH",
        default_value = "./.specimen/storage"
    )]
    pub fs_path: PathBuf,
}

impl StorageConfig {
    /// Create the configuration from the environment only (no command line arguments).
    pub fn from_env() -> Result<Self, clap::Error> {
        use clap::Parser;

        #[derive(clap::Parser)]
        struct Cli {
            #[command(flatten)]
            storage: StorageConfig,
        }

        Cli::try_parse_from(["specimen"]).map(|cli| cli.storage)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::service::{fs::FileSystemBackend, StorageBackend};
    use test_log::test;

    #[test(tokio::test)]
    async fn backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            fs_path: dir.path().join("storage"),
        };

        let backend = FileSystemBackend::from_config(&config).await.unwrap();
        let result = backend.store(&b"Hello World"[..]).await.unwrap();

        assert!(dir
            .path()
            .join("storage")
            .join("content")
            .join(&result.key().as_str()[0..2])
            .is_dir());
    }
}
