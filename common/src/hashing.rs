use ring::digest::{Context, Digest, SHA1_FOR_LEGACY_USE_ONLY, SHA256, SHA512};
use std::{
    io::Read,
    path::Path,
    pin::Pin,
    task::{self, Poll},
};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tracing::instrument;

/// The type reported when the content cannot be identified.
pub const UNKNOWN_TYPE: &str = "application/octet-stream";

pub struct HashingRead<R> {
    inner: R,
    contexts: Contexts,
}

/// Running digest state of all algorithms used to identify a sample.
pub struct Contexts {
    crc32: crc32fast::Hasher,
    md5: md5::Context,
    sha1: Context,
    sha256: Context,
    sha512: Context,
    size: u64,
}

impl Contexts {
    pub fn new() -> Self {
        Self {
            crc32: crc32fast::Hasher::new(),
            md5: md5::Context::new(),
            sha1: Context::new(&SHA1_FOR_LEGACY_USE_ONLY),
            sha256: Context::new(&SHA256),
            sha512: Context::new(&SHA512),
            size: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.crc32.update(data);
        self.md5.consume(data);
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha512.update(data);
        self.size += data.len() as u64;
    }

    pub fn digests(&self) -> Digests {
        Digests {
            crc32: self.crc32.clone().finalize(),
            md5: self.md5.clone().compute(),
            sha1: self.sha1.clone().finish(),
            sha256: self.sha256.clone().finish(),
            sha512: self.sha512.clone().finish(),
            size: self.size,
        }
    }

    pub fn finish(self) -> Digests {
        Digests {
            crc32: self.crc32.finalize(),
            md5: self.md5.compute(),
            sha1: self.sha1.finish(),
            sha256: self.sha256.finish(),
            sha512: self.sha512.finish(),
            size: self.size,
        }
    }
}

impl Default for Contexts {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct Digests {
    pub crc32: u32,
    pub md5: md5::Digest,
    pub sha1: Digest,
    pub sha256: Digest,
    pub sha512: Digest,
    pub size: u64,
}

impl Digests {
    #[instrument(skip_all, fields(len=data.as_ref().len()))]
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        let mut contexts = Contexts::new();
        contexts.update(data.as_ref());
        contexts.finish()
    }

    /// Digest the content of a file, streaming it from disk.
    #[instrument(err)]
    pub async fn digest_file(path: &Path) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let mut reader = HashingRead::new(file);
        tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
        Ok(reader.contexts.finish())
    }

    /// The CRC32 as upper-case, zero padded hex string
    pub fn crc32_hex(&self) -> String {
        format!("{:08X}", self.crc32)
    }

    pub fn md5_hex(&self) -> String {
        format!("{:x}", self.md5)
    }

    pub fn sha1_hex(&self) -> String {
        hex::encode(self.sha1.as_ref())
    }

    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256.as_ref())
    }

    pub fn sha512_hex(&self) -> String {
        hex::encode(self.sha512.as_ref())
    }
}

impl<R> HashingRead<R> {
    /// Creates a HashingRead that uses CRC32, MD5, SHA-1, SHA-256, and SHA-512
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            contexts: Contexts::new(),
        }
    }

    /// Returns the current digests of the **data read so far**
    pub fn digests(&self) -> Digests {
        self.contexts.digests()
    }
}

impl<R: Read> HashingRead<R> {
    /// Finishes reading all data from the inner reader and returns the digests
    /// Takes ownership of self to prevent misuse
    pub fn finish(mut self) -> std::io::Result<Digests> {
        Read::read_to_end(&mut self, &mut Vec::new())?;
        Ok(self.contexts.finish())
    }
}

impl<R: Read> Read for HashingRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = self.inner.read(buf)?;
        self.contexts.update(&buf[0..len]);
        Ok(len)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingRead<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                this.contexts.update(&buf.filled()[before..]);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Detect a MIME-like type label from the magic number of the content.
pub fn sniff_type(data: &[u8]) -> String {
    infer::get(data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string())
}

/// Detect a MIME-like type label, reading only the head of the file.
pub async fn sniff_file_type(path: &Path) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(8192);
    tokio::fs::File::open(path)
        .await?
        .take(8192)
        .read_to_end(&mut head)
        .await?;
    Ok(sniff_type(&head))
}

#[cfg(test)]
mod test {
    use super::*;
    use ring::digest::digest;
    use test_log::test;

    const HELLO_WORLD: &[u8] = b"Hello World";

    /// HashingRead should read data correctly
    #[test]
    fn read() {
        let mut reader = HashingRead::new(HELLO_WORLD);
        let mut buf = Vec::new();
        Read::read_to_end(&mut reader, &mut buf).unwrap();
        assert_eq!(buf, HELLO_WORLD);
    }

    #[test]
    fn known_digests() {
        let digests = HashingRead::new(HELLO_WORLD).finish().unwrap();

        assert_eq!(digests.size, 11);
        assert_eq!(digests.crc32_hex(), "4A17B156");
        assert_eq!(digests.md5_hex(), "b10a8db164e0754105b7a99be72e3fe5");
        assert_eq!(
            digests.sha1_hex(),
            "0a4d55a8d778e5022fab701977c5d840bbc486d0"
        );
        assert_eq!(
            digests.sha256_hex(),
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e"
        );
        assert_eq!(
            digests.sha512.as_ref(),
            digest(&SHA512, HELLO_WORLD).as_ref()
        );
    }

    /// HashingRead should return the correct hash of the data read so far
    #[test]
    fn intermediate_digests() {
        let mut reader = HashingRead::new(HELLO_WORLD);
        let mut buf = [0u8; 5];
        Read::read_exact(&mut reader, &mut buf).unwrap();
        let digests = reader.digests();

        assert_eq!(digests.size, 5);
        assert_eq!(digests.sha256.as_ref(), digest(&SHA256, b"Hello").as_ref());
    }

    #[test(tokio::test)]
    async fn async_read_matches_sync() {
        let mut reader = HashingRead::new(HELLO_WORLD);
        let mut buf = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut buf)
            .await
            .unwrap();

        assert_eq!(buf, HELLO_WORLD);
        assert_eq!(
            reader.digests().sha256_hex(),
            Digests::digest(HELLO_WORLD).sha256_hex()
        );
    }

    #[test]
    fn sniff() {
        assert_eq!(sniff_type(b"%PDF-1.7\n"), "application/pdf");
        assert_eq!(sniff_type(HELLO_WORLD), UNKNOWN_TYPE);
    }
}
