use async_trait::async_trait;
use reqwest::Client;

use crate::errors::{AppResult, TransportError};

use super::outcome::HttpReply;
use super::payload::{DashboardRequest, RequestBody};

/// Sends one prepared request and reports what came back. Classification
/// happens above this seam so fakes only need to produce replies or
/// transport errors.
#[async_trait]
pub trait DashboardTransport: Send + Sync {
    async fn post(&self, request: &DashboardRequest) -> Result<HttpReply, TransportError>;
}

/// Performance dashboard client over reqwest
pub struct DashboardClient {
    client: Client,
}

impl DashboardClient {
    pub fn new() -> AppResult<Self> {
        Ok(Self {
            client: Client::builder().build()?,
        })
    }
}

#[async_trait]
impl DashboardTransport for DashboardClient {
    async fn post(&self, request: &DashboardRequest) -> Result<HttpReply, TransportError> {
        let mut builder = self.client.post(&request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Compressed(bytes) => builder.body(bytes.clone()),
        };

        log::debug!("POST {}", request.url);

        let response = builder.send().await?;
        let status = response.status();

        let response_text = response.text().await.unwrap_or_default();
        if !response_text.is_empty() {
            log::debug!(
                "Dashboard response {} (first 300 chars): {}",
                status,
                response_text.chars().take(300).collect::<String>()
            );
        }

        Ok(HttpReply::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown"),
        ))
    }
}
