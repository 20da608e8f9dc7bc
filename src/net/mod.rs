//! The one network capability toys get: fetch a URL, read the body as text.

mod canned;
mod http;

use futures_util::future::LocalBoxFuture;
use thiserror::Error;

pub use canned::StaticFetch;
pub use http::HttpFetcher;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request failed: {0}")]
    Network(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

pub trait Response {
    fn status(&self) -> u16;
    fn text(self: Box<Self>) -> LocalBoxFuture<'static, Result<String, FetchError>>;
}

pub trait Fetch {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Box<dyn Response>, FetchError>>;
}

pub(crate) fn parse_url(raw: &str) -> Result<url::Url, FetchError> {
    url::Url::parse(raw).map_err(|source| FetchError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}
