//! Integration tests for LocalFileTransport

use capsule_storage::{ContentTransport, LocalFileTransport, StorageError, content_id_for};
use tempfile::TempDir;

#[tokio::test]
async fn test_local_roundtrip() {
    let temp = TempDir::new().unwrap();
    let transport = LocalFileTransport::new(temp.path()).await.unwrap();

    let data = b"Local file transport test";
    let receipt = transport.upload(data).await.unwrap();
    assert_eq!(receipt.content_id, content_id_for(data));

    let retrieved = transport.download(&receipt.content_id).await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_local_persistence() {
    let temp = TempDir::new().unwrap();
    let data = b"Persistent data";

    // Write with one instance
    let content_id = {
        let transport = LocalFileTransport::new(temp.path()).await.unwrap();
        transport.upload(data).await.unwrap().content_id
    };

    // Read with new instance
    let transport = LocalFileTransport::new(temp.path()).await.unwrap();
    assert_eq!(transport.download(&content_id).await.unwrap(), data);
    assert_eq!(transport.stat(&content_id).await.unwrap().size, data.len() as u64);
}

#[tokio::test]
async fn test_local_layout() {
    let temp = TempDir::new().unwrap();
    let transport = LocalFileTransport::new(temp.path()).await.unwrap();

    let receipt = transport.upload(b"layout").await.unwrap();
    let path = temp.path().join("content").join("b3").join(&receipt.content_id);
    assert!(path.is_file());
}

#[tokio::test]
async fn test_local_not_found() {
    let temp = TempDir::new().unwrap();
    let transport = LocalFileTransport::new(temp.path()).await.unwrap();

    let missing = content_id_for(b"missing");
    assert!(matches!(
        transport.download(&missing).await,
        Err(StorageError::NotFound(_))
    ));
    assert!(!transport.exists(&missing).await.unwrap());
}

#[tokio::test]
async fn test_local_rejects_invalid_ids() {
    let temp = TempDir::new().unwrap();
    let transport = LocalFileTransport::new(temp.path()).await.unwrap();

    for bad in ["../secret", "", "not-base58-0OIl"] {
        assert!(matches!(
            transport.download(bad).await,
            Err(StorageError::InvalidContentId(_))
        ));
    }
}

#[tokio::test]
async fn test_local_detects_on_disk_corruption() {
    let temp = TempDir::new().unwrap();
    let transport = LocalFileTransport::new(temp.path()).await.unwrap();

    let receipt = transport.upload(b"original bytes").await.unwrap();
    let path = temp.path().join("content").join("b3").join(&receipt.content_id);
    std::fs::write(&path, b"swapped bytes").unwrap();

    assert!(matches!(
        transport.download(&receipt.content_id).await,
        Err(StorageError::HashMismatch { .. })
    ));
}
