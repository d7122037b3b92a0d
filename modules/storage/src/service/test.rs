use crate::service::{StorageBackend, StorageKey};
use futures::future::join_all;

pub const HELLO_WORLD_KEY: &str =
    "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e";

pub async fn test_store_read_and_delete<B: StorageBackend>(backend: B) {
    let result = backend
        .store(&b"Hello World"[..])
        .await
        .expect("store must succeed");

    assert_eq!(result.key().as_str(), HELLO_WORLD_KEY);

    let content = backend
        .retrieve_buf(result.key())
        .await
        .expect("retrieve must succeed")
        .expect("must be found");

    assert_eq!(content.as_ref(), b"Hello World");

    backend
        .delete(result.key())
        .await
        .expect("delete must succeed");
    assert!(backend.retrieve_buf(result.key()).await.unwrap().is_none());
    backend
        .delete(result.key())
        .await
        .expect("delete should be idempotent");
}

pub async fn test_read_not_found<B: StorageBackend>(backend: B) {
    let key: StorageKey = HELLO_WORLD_KEY.parse().unwrap();

    let content = backend
        .retrieve_buf(key)
        .await
        .expect("retrieve must succeed");

    assert!(content.is_none());
}

pub async fn test_store_concurrently<B: StorageBackend>(backend: B) {
    let results = join_all((0..8).map(|_| backend.store(&b"Hello World"[..]))).await;

    for result in results {
        assert_eq!(result.unwrap().key().as_str(), HELLO_WORLD_KEY);
    }

    let content = backend
        .retrieve_buf(HELLO_WORLD_KEY.parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(content.as_ref(), b"Hello World");
}

#[test]
fn key_must_be_sha256() {
    assert!(HELLO_WORLD_KEY.parse::<StorageKey>().is_ok());
    assert!("a591a6".parse::<StorageKey>().is_err());
    assert!(HELLO_WORLD_KEY
        .to_uppercase()
        .parse::<StorageKey>()
        .is_err());
    assert!("../../../../etc/passwd".parse::<StorageKey>().is_err());
}
