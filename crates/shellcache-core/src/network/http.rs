//! reqwest-backed fetcher.

use std::time::Duration;

use reqwest::header::{HeaderMap, ACCESS_CONTROL_ALLOW_ORIGIN};
use reqwest::{Client, Method};
use tracing::debug;

use super::Fetcher;
use crate::error::FetchError;
use crate::http::{Request, Response, ResponseType, Url};

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fetcher for the real network.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    scope: Url,
}

impl HttpFetcher {
    /// Create a fetcher that classifies responses relative to `scope`'s origin.
    pub fn new(scope: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, scope })
    }

    fn build(&self, request: &Request) -> Result<reqwest::RequestBuilder, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::InvalidRequest(format!("bad method {}", request.method)))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(builder)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self.build(request)?.send().await?;

        let status = response.status().as_u16();
        let response_type = classify(&self.scope, response.url(), response.headers());
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
        let body = response.bytes().await?.to_vec();

        debug!(
            method = %request.method,
            url = %request.url,
            status = status,
            response_type = %response_type,
            bytes = body.len(),
            "Network response"
        );

        Ok(Response {
            status,
            headers,
            body,
            response_type,
        })
    }
}

/// Classify a response by where it finally came from.
///
/// Same origin as the scope is `basic`. Cross-origin is `cors` when the
/// server granted access with `Access-Control-Allow-Origin`, `opaque`
/// otherwise.
pub fn classify(scope: &Url, final_url: &Url, headers: &HeaderMap) -> ResponseType {
    if final_url.origin() == scope.origin() {
        return ResponseType::Basic;
    }

    let page_origin = scope.origin().ascii_serialization();
    let allowed = headers
        .get(ACCESS_CONTROL_ALLOW_ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "*" || v.trim() == page_origin)
        .unwrap_or(false);

    if allowed {
        ResponseType::Cors
    } else {
        ResponseType::Opaque
    }
}
