//! Object storage proxy client.
//!
//! Thin request/response client for the S3-compatible service that holds
//! voice recordings and assistant config blobs. Path-style addressing
//! (`{endpoint}/{bucket}/{key}`) with optional bearer auth; deliberately
//! no retry or consistency logic; failures surface to the HTTP handlers
//! that fronted the request.

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the storage proxy.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage endpoint could not be reached or the request failed
    /// at the transport level.
    #[error("storage request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The storage service answered with an unexpected status.
    #[error("storage returned {status} for '{key}'")]
    Unexpected { status: StatusCode, key: String },

    /// An object expected to hold JSON did not parse.
    #[error("invalid JSON in object '{key}': {source}")]
    Json {
        key: String,
        source: serde_json::Error,
    },
}

/// One object in a bucket listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobEntry {
    pub filename: String,
    pub size: u64,
    pub last_modified: String,
}

/// Client for one bucket on an S3-compatible endpoint.
pub struct BlobStore {
    endpoint: String,
    bucket: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl BlobStore {
    pub fn new(endpoint: &str, bucket: &str, bearer_token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            bearer_token,
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Builds the ListObjectsV2 request; reqwest percent-encodes the
    /// prefix, so keys with `&`, `#` or spaces survive intact.
    fn list_request(&self, prefix: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.endpoint, self.bucket);
        self.authorize(
            self.client
                .get(&url)
                .query(&[("list-type", "2"), ("prefix", prefix)]),
        )
    }

    /// Lists objects in the bucket, optionally under a prefix, newest
    /// first.
    pub async fn list(&self, prefix: &str) -> Result<Vec<BlobEntry>, StorageError> {
        let resp = self.list_request(prefix).send().await?;
        if !resp.status().is_success() {
            return Err(StorageError::Unexpected {
                status: resp.status(),
                key: format!("?prefix={prefix}"),
            });
        }

        let body = resp.text().await?;
        let mut entries = parse_list_response(&body);
        entries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(entries)
    }

    /// Fetches an object as a streaming response so large audio files can
    /// be proxied without buffering.
    pub async fn get_stream(&self, key: &str) -> Result<reqwest::Response, StorageError> {
        let resp = self
            .authorize(self.client.get(self.object_url(key)))
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(resp),
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(key.to_string())),
            status => Err(StorageError::Unexpected {
                status,
                key: key.to_string(),
            }),
        }
    }

    /// Reads a JSON object. Returns `Ok(None)` if the object does not
    /// exist yet, so callers can present an empty default.
    pub async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, StorageError> {
        let resp = self
            .authorize(self.client.get(self.object_url(key)))
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => {
                let text = resp.text().await?;
                let value = serde_json::from_str(&text).map_err(|source| StorageError::Json {
                    key: key.to_string(),
                    source,
                })?;
                Ok(Some(value))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(StorageError::Unexpected {
                status,
                key: key.to_string(),
            }),
        }
    }

    /// Serializes a JSON value and writes it to the bucket.
    pub async fn put_json(&self, key: &str, data: &serde_json::Value) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(data).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        self.put_bytes(key, body, "application/json").await
    }

    /// Writes raw bytes to the bucket with the given content type.
    pub async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let resp = self
            .authorize(
                self.client
                    .put(self.object_url(key))
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(bytes),
            )
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StorageError::Unexpected {
                status: resp.status(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

/// Extracts `<Contents>` entries from a ListObjectsV2 XML response.
///
/// The response schema is stable and flat, so a tag scanner is enough; a
/// malformed document degrades to an empty (or partial) listing rather
/// than an error, matching the dashboard's read-only use of the listing.
fn parse_list_response(xml: &str) -> Vec<BlobEntry> {
    let mut entries = Vec::new();
    let mut rest = xml;

    while let Some(block) = next_tag_body(rest, "Contents") {
        let (body, remainder) = block;
        if let Some((key, _)) = next_tag_body(body, "Key") {
            let size = next_tag_body(body, "Size")
                .and_then(|(s, _)| s.trim().parse().ok())
                .unwrap_or(0);
            let last_modified = next_tag_body(body, "LastModified")
                .map(|(s, _)| s.trim().to_string())
                .unwrap_or_default();
            entries.push(BlobEntry {
                filename: key.trim().to_string(),
                size,
                last_modified,
            });
        }
        rest = remainder;
    }

    entries
}

/// Returns the body of the first `<tag>...</tag>` pair in `input`, plus
/// the remainder after the closing tag.
fn next_tag_body<'a>(input: &'a str, tag: &str) -> Option<(&'a str, &'a str)> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = input.find(&open)? + open.len();
    let end = start + input[start..].find(&close)?;
    Some((&input[start..end], &input[end + close.len()..]))
}
