use buddy_protocol::{CreatedThread, LogEntry, StreamRequest, ThreadDetail, ThreadSummary};
use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, StatusCode};
use url::Url;

use super::{Backend, ByteStream};
use crate::config::ServerConfig;
use crate::error::ChatError;

/// [`Backend`] over the pipeline's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    config: ServerConfig,
}

impl HttpBackend {
    pub fn new(config: &ServerConfig) -> Result<Self, ChatError> {
        let base = Url::parse(config.base_url.trim())?;
        if base.cannot_be_a_base() {
            return Err(ChatError::InvalidUrl(format!(
                "{} cannot be used as a base url",
                config.base_url
            )));
        }
        // No overall timeout: event streams stay open for the whole turn.
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|err| ChatError::Transport(format!("build http client: {err}")))?;
        Ok(Self {
            client,
            base,
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChatError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ChatError::InvalidUrl(self.base.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// `GET /`.
    pub async fn health(&self) -> Result<(), ChatError> {
        let response = self
            .client
            .get(self.endpoint(&[])?)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    /// `GET /threads`, most recently updated first.
    pub async fn list_threads(&self) -> Result<Vec<ThreadSummary>, ChatError> {
        let response = self
            .client
            .get(self.endpoint(&["threads"])?)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// `POST /threads`.
    pub async fn create_thread(&self) -> Result<CreatedThread, ChatError> {
        let response = self
            .client
            .post(self.endpoint(&["threads"])?)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// `DELETE /threads/{id}`.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        let response = self
            .client
            .delete(self.endpoint(&["threads", thread_id])?)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    /// `GET /threads/{id}/detailed`, as sent.
    pub async fn thread_detail(&self, thread_id: &str) -> Result<ThreadDetail, ChatError> {
        let response = self
            .client
            .get(self.endpoint(&["threads", thread_id, "detailed"])?)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    async fn open(&self, thread_id: &str, content: &str) -> Result<ByteStream, ChatError> {
        let response = self
            .client
            .post(self.endpoint(&["threads", thread_id, "stream"])?)
            .header(ACCEPT, "text/event-stream")
            .json(&StreamRequest {
                content: content.to_string(),
            })
            .send()
            .await?;
        let response = ensure_success(response).await?;
        tracing::debug!(%thread_id, "event stream opened");
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from))
            .boxed())
    }

    async fn cancel(&self, thread_id: &str) -> Result<(), ChatError> {
        let response = self
            .client
            .delete(self.endpoint(&["threads", thread_id, "stream"])?)
            .timeout(self.config.request_timeout())
            .send()
            .await?;
        // 404: the thread has no active stream.
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(%thread_id, "no active stream to cancel");
            return Ok(());
        }
        ensure_success(response).await.map(|_| ())
    }

    async fn entries(&self, thread_id: &str) -> Result<Vec<LogEntry>, ChatError> {
        Ok(self.thread_detail(thread_id).await?.into_entries()?)
    }
}

impl Backend for HttpBackend {
    fn open_stream<'a>(
        &'a self,
        thread_id: &'a str,
        content: &'a str,
    ) -> BoxFuture<'a, Result<ByteStream, ChatError>> {
        Box::pin(self.open(thread_id, content))
    }

    fn cancel_stream<'a>(&'a self, thread_id: &'a str) -> BoxFuture<'a, Result<(), ChatError>> {
        Box::pin(self.cancel(thread_id))
    }

    fn fetch_entries<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<LogEntry>, ChatError>> {
        Box::pin(self.entries(thread_id))
    }
}

async fn ensure_success(response: Response) -> Result<Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Http {
        status: status.as_u16(),
        body,
    })
}
