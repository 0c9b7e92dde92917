//! IPFS HTTP API transport (feature `ipfs`)
//!
//! Talks to a Kubo-compatible node: `/api/v0/add`, `/api/v0/cat` and
//! `/api/v0/files/stat`. Content ids are the node's CIDs, not BLAKE3 ids,
//! so integrity rests on the AEAD tag and the recorded plaintext hash.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::{StorageError, StorageResult};
use crate::traits::{ContentStat, ContentTransport, UploadReceipt};

pub struct IpfsTransport {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StatResponse {
    size: u64,
}

impl IpfsTransport {
    /// `api_url` is the node's API root, e.g. `http://127.0.0.1:5001`
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v0/{path}", self.api_url)
    }

    async fn post(&self, path: &str, arg: &str) -> StorageResult<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint(path))
            .query(&[("arg", arg)])
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.contains("not found") || body.contains("no link named") {
            Err(StorageError::NotFound(arg.to_string()))
        } else {
            Err(StorageError::Backend(format!("IPFS {path} returned {status}: {body}")))
        }
    }
}

#[async_trait]
impl ContentTransport for IpfsTransport {
    fn name(&self) -> &'static str {
        "ipfs"
    }

    async fn upload(&self, data: &[u8]) -> StorageResult<UploadReceipt> {
        let form = Form::new().part("file", Part::bytes(data.to_vec()).file_name("capsule.bin"));
        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("pin", "true")])
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Backend(format!("IPFS add returned {status}: {body}")));
        }

        let added: AddResponse = response.json().await?;
        tracing::debug!(cid = %added.hash, size = data.len(), "Uploaded to IPFS");

        Ok(UploadReceipt {
            content_id: added.hash,
            size: data.len() as u64,
            hash: *blake3::hash(data).as_bytes(),
        })
    }

    async fn download(&self, content_id: &str) -> StorageResult<Vec<u8>> {
        let response = self.post("cat", content_id).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn exists(&self, content_id: &str) -> StorageResult<bool> {
        match self.stat(content_id).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn stat(&self, content_id: &str) -> StorageResult<ContentStat> {
        let path = format!("/ipfs/{content_id}");
        let response = self.post("files/stat", &path).await?;
        let stat: StatResponse = response.json().await?;
        Ok(ContentStat {
            size: stat.size,
            content_type: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalizes_trailing_slash() {
        let transport = IpfsTransport::new("http://127.0.0.1:5001/");
        assert_eq!(transport.endpoint("add"), "http://127.0.0.1:5001/api/v0/add");
    }
}
