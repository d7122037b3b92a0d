use crate::{
    config::StorageConfig,
    service::{StorageBackend, StorageKey, StorageResult},
};
use anyhow::Context;
use bytes::Bytes;
use futures::Stream;
use specimen_common::hashing::HashingRead;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tempfile::{tempdir, NamedTempFile, TempDir};
use tokio::{
    fs::{create_dir_all, remove_file, File},
    io::{AsyncRead, AsyncWriteExt},
};
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// A filesystem backed, content addressed store
///
/// ## Layout
///
/// ```ignore
/// <base>/
///   content/
///     <digest[0..2]>/
///       <digest[2..4]>/
///         <digest> # file
/// ```
///
/// Limits the number of entries of each directory. The first two layers have at most 256 entries
/// each.
///
/// New content is first written to a temporary file in the `content` directory, and then renamed
/// to its final location. So the final location either doesn't exist, or has the full content.
/// Writers storing the same content concurrently end up with the same file.
#[derive(Clone, Debug)]
pub struct FileSystemBackend {
    content: PathBuf,
}

const NUM_LEVELS: usize = 2;

impl FileSystemBackend {
    pub async fn new(base: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let base = base.into();
        let content = base.join("content");

        create_dir_all(&content).await.with_context(|| {
            format!(
                "unable to create 'content' directory in the file system base: {}",
                base.display()
            )
        })?;

        Ok(Self { content })
    }

    pub async fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        Self::new(&config.fs_path).await
    }

    /// Create a new storage for testing
    pub async fn for_test() -> anyhow::Result<(Self, TempDir)> {
        let dir = tempdir()?;

        Self::new(dir.path()).await.map(|result| (result, dir))
    }

    fn locate(&self, key: &StorageKey) -> PathBuf {
        level_dir(&self.content, key.as_str(), NUM_LEVELS).join(key.as_str())
    }
}

impl StorageBackend for FileSystemBackend {
    type Error = std::io::Error;

    #[instrument(skip_all, err)]
    async fn store<R>(&self, reader: R) -> Result<StorageResult, Self::Error>
    where
        R: AsyncRead + Unpin,
    {
        // the temp file is removed when dropped, unless it got persisted
        let content = self.content.clone();
        let (file, temp) = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(".upload-")
                .tempfile_in(content)
                .map(NamedTempFile::into_parts)
        })
        .await
        .map_err(std::io::Error::other)??;

        let mut file = File::from_std(file);
        let mut reader = HashingRead::new(reader);
        tokio::io::copy(&mut reader, &mut file).await?;

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let result = StorageResult {
            digests: reader.digests(),
        };

        let key = result.key();
        let target = self.locate(&key);
        if let Some(parent) = target.parent() {
            create_dir_all(parent).await?;
        }

        log::debug!("Storing content: {}", target.display());

        tokio::task::spawn_blocking(move || temp.persist(target).map_err(|err| err.error))
            .await
            .map_err(std::io::Error::other)??;

        Ok(result)
    }

    async fn retrieve<'a>(
        &self,
        key: StorageKey,
    ) -> Result<Option<impl Stream<Item = Result<Bytes, Self::Error>> + 'a>, Self::Error> {
        let target = self.locate(&key);

        log::debug!("Opening file: {}", target.display());

        let file = match File::open(&target).await {
            Ok(file) => Some(file),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };

        Ok(file.map(ReaderStream::new))
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: StorageKey) -> Result<(), Self::Error> {
        match remove_file(self.locate(&key)).await {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }
}

fn level_dir(base: impl AsRef<Path>, hash: &str, levels: usize) -> PathBuf {
    let prefixes = hash
        .chars()
        .take(levels * 2)
        .collect::<Vec<char>>()
        .chunks(2)
        .map(|chunk| chunk.iter().collect())
        .collect::<Vec<String>>();

    let mut path = base.as_ref().to_path_buf();

    for prefix in prefixes {
        path = path.join(prefix);
    }

    path
}
