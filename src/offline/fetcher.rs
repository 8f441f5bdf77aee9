//! Network access for the interceptor.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Url;

use super::request::{Request, Response, ResponseType};

/// Default timeout for HTTP requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while fetching from the network.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("network unavailable: {0}")]
    Offline(String),
}

/// Performs network requests on behalf of the interceptor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// [`Fetcher`] backed by reqwest.
///
/// Responses from the application's origin are typed [`ResponseType::Basic`],
/// everything else [`ResponseType::Cors`].
pub struct HttpFetcher {
    origin: Url,
    http_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(origin: Url) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            origin,
            http_client,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn response_type_for(&self, url: &Url) -> ResponseType {
        if url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url();
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(FetchError::UnsupportedScheme(url.scheme().to_string()));
        }

        log::debug!("{} {}", request.method(), url);
        let response = self
            .http_client
            .request(request.method().clone(), url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let response_type = self.response_type_for(response.url());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        Ok(Response {
            status,
            headers,
            body: body.into(),
            response_type,
        })
    }
}
