//! Network access for the proxy.
//!
//! The proxy only ever asks for "fetch this request". `HttpFetcher` answers
//! with reqwest; tests substitute their own `Fetcher`.

pub mod http;

use std::future::Future;

use crate::error::FetchError;
use crate::http::{Request, Response};

pub use self::http::HttpFetcher;

pub trait Fetcher: Send + Sync + 'static {
    /// Perform the request. Only transport failures are errors.
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}
