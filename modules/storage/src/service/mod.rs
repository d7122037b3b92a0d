pub mod fs;

#[cfg(test)]
mod test;

use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use specimen_common::hashing::Digests;
use std::{
    fmt::{Debug, Display, Formatter},
    future::Future,
    str::FromStr,
};
use tokio::io::AsyncRead;

/// The key of a stored blob: the lower-case hex encoded SHA-256 digest of its content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StorageKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid storage key: {0}")]
pub struct KeyError(String);

impl FromStr for StorageKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            Ok(Self(s.to_string()))
        } else {
            Err(KeyError(s.to_string()))
        }
    }
}

/// Outcome of storing content
#[derive(Clone, Debug)]
pub struct StorageResult {
    /// digests of the content, as it was read from the source
    pub digests: Digests,
}

impl StorageResult {
    pub fn key(&self) -> StorageKey {
        StorageKey(self.digests.sha256_hex())
    }
}

pub trait StorageBackend {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store the content from a reader
    fn store<R>(&self, reader: R) -> impl Future<Output = Result<StorageResult, Self::Error>>
    where
        R: AsyncRead + Unpin;

    /// Retrieve the content as a stream, `None` if there is no content for this key
    fn retrieve<'a>(
        &self,
        key: StorageKey,
    ) -> impl Future<Output = Result<Option<impl Stream<Item = Result<Bytes, Self::Error>> + 'a>, Self::Error>>;

    /// Delete the stored content.
    ///
    /// Deleting content which doesn't exist is not an error.
    fn delete(&self, key: StorageKey) -> impl Future<Output = Result<(), Self::Error>>;

    /// Retrieve the content as a byte buffer
    fn retrieve_buf(
        &self,
        key: StorageKey,
    ) -> impl Future<Output = Result<Option<Bytes>, Self::Error>> {
        async move {
            Ok(match self.retrieve(key).await? {
                Some(stream) => Some(stream.try_collect::<BytesMut>().await?.freeze()),
                None => None,
            })
        }
    }
}
