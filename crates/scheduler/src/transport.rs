use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::model::{OutboundRequest, TransportReply};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportReply, TransportError>;
}

/// Posts form-encoded bodies over HTTP.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: Url) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Relative destinations resolve against the base endpoint.
    pub fn resolve(&self, destination: &str) -> Result<Url, TransportError> {
        if destination.is_empty() {
            return Ok(self.base.clone());
        }
        self.base
            .join(destination)
            .map_err(|err| TransportError::InvalidDestination(format!("{destination}: {err}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportReply, TransportError> {
        let url = self.resolve(&request.destination)?;
        debug!(request = %request.id, %url, fields = request.fields.len(), "posting update");
        let response = self
            .client
            .post(url)
            .form(&request.fields)
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(TransportReply { status, body })
    }
}

/// Transport answering from a fixed script of replies; records what was sent.
/// Once the script runs out it answers `200 {}`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<TransportReply, TransportError>>>,
    sent: Mutex<Vec<OutboundRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_reply(&self, reply: Result<TransportReply, TransportError>) {
        self.replies.lock().push_back(reply);
    }

    pub fn push_body(&self, body: impl Into<String>) {
        self.push_reply(Ok(TransportReply::ok(body)));
    }

    pub fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportReply, TransportError> {
        self.sent.lock().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = self.replies.lock().pop_front();
        next.unwrap_or_else(|| Ok(TransportReply::ok("{}")))
    }
}
