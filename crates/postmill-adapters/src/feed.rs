//! Feed providers: ordered post lists from a file or an HTTP endpoint.

use std::path::PathBuf;

use async_trait::async_trait;
use postmill_core::Post;
use postmill_storage::HttpFetcher;
use serde::Deserialize;
use tokio::fs;

use crate::AdapterError;

/// Raw payload plus the posts decoded from it, in feed order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPayload {
    pub raw: Vec<u8>,
    pub posts: Vec<Post>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self) -> Result<FeedPayload, AdapterError>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedDocument {
    Envelope { data: Vec<Post> },
    Bare(Vec<Post>),
}

/// Decode a Graph-style `{"data": [...]}` envelope or a bare post array.
pub fn decode_feed(raw: &[u8]) -> Result<Vec<Post>, AdapterError> {
    let document: FeedDocument = serde_json::from_slice(raw)?;
    Ok(match document {
        FeedDocument::Envelope { data } => data,
        FeedDocument::Bare(posts) => posts,
    })
}

#[derive(Debug, Clone)]
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedSource for FileFeed {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self) -> Result<FeedPayload, AdapterError> {
        let raw = fs::read(&self.path).await.map_err(|err| {
            AdapterError::Message(format!("reading feed {}: {err}", self.path.display()))
        })?;
        let posts = decode_feed(&raw)?;
        Ok(FeedPayload { raw, posts })
    }
}

pub struct HttpFeed {
    url: String,
    http: HttpFetcher,
}

impl HttpFeed {
    pub fn new(url: impl Into<String>, http: HttpFetcher) -> Self {
        Self {
            url: url.into(),
            http,
        }
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self) -> Result<FeedPayload, AdapterError> {
        let raw = self.http.fetch_bytes(self.name(), &self.url).await?;
        let posts = decode_feed(&raw)?;
        Ok(FeedPayload { raw, posts })
    }
}
