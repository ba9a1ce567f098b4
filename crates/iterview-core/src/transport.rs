//! Transports: how a submission reaches the server and how the body comes back.
//!
//! The controller only sees two seams. [`Transport::submit`] resolves once the
//! response headers arrive, and [`ChunkSource::next_chunk`] yields body chunks
//! until end of stream. Those are the only suspension points of a session.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{Result, StreamError};
use crate::submission::Submission;

/// Sequential reader over a response body.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk, or `None` at end of stream.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Status line and body of a submission response.
pub struct SubmitResponse {
    pub status: u16,
    pub body: Box<dyn ChunkSource>,
}

impl SubmitResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for SubmitResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Sends a submission and hands back the streamed response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, submission: &Submission) -> Result<SubmitResponse>;
}

type BoxedByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// [`ChunkSource`] over any stream of byte chunks.
pub struct StreamChunkSource {
    inner: BoxedByteStream,
}

impl StreamChunkSource {
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
        }
    }
}

#[async_trait]
impl ChunkSource for StreamChunkSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.inner.next().await.transpose()
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Multipart POST over HTTP with a streamed response body.
pub struct HttpTransport {
    config: ClientConfig,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for the given config
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(HttpTransport {
            config,
            http_client,
        })
    }

    /// Create transport from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, submission: &Submission) -> Result<SubmitResponse> {
        let url = self.config.submit_url();
        debug!(
            url = %url,
            file_name = %submission.file_name(),
            bytes = submission.image().len(),
            iterations = submission.iterations().get(),
            "Posting submission"
        );

        let response = self
            .http_client
            .post(&url)
            .multipart(submission.to_form()?)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamError::from));

        Ok(SubmitResponse {
            status,
            body: Box::new(StreamChunkSource::new(body)),
        })
    }
}

// ---------------------------------------------------------------------------
// ReplayTransport
// ---------------------------------------------------------------------------

/// Replays a captured response body, cut into fixed-size chunks.
///
/// Chunk cuts ignore both message and character boundaries, which makes this
/// useful for checking how a capture survives arbitrary network framing.
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    body: Bytes,
    chunk_size: usize,
    status: u16,
}

impl ReplayTransport {
    pub fn new(body: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            body: body.into(),
            chunk_size: chunk_size.max(1),
            status: 200,
        }
    }

    /// Read a capture from disk.
    pub async fn from_file(path: &std::path::Path, chunk_size: usize) -> Result<Self> {
        let body = tokio::fs::read(path).await?;
        Ok(Self::new(body, chunk_size))
    }

    /// Replay with a different status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    fn chunks(&self) -> Vec<Bytes> {
        (0..self.body.len())
            .step_by(self.chunk_size)
            .map(|start| {
                let end = (start + self.chunk_size).min(self.body.len());
                self.body.slice(start..end)
            })
            .collect()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn submit(&self, _submission: &Submission) -> Result<SubmitResponse> {
        let chunks = self.chunks().into_iter().map(Ok);
        Ok(SubmitResponse {
            status: self.status,
            body: Box::new(StreamChunkSource::new(stream::iter(chunks))),
        })
    }
}
