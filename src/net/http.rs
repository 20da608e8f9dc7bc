use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use tracing::debug;

use super::{parse_url, Fetch, FetchError, Response};
use crate::config::RuntimeConfig;

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &RuntimeConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

struct HttpResponse(reqwest::Response);

impl Response for HttpResponse {
    fn status(&self) -> u16 {
        self.0.status().as_u16()
    }

    fn text(self: Box<Self>) -> LocalBoxFuture<'static, Result<String, FetchError>> {
        let HttpResponse(response) = *self;
        async move {
            response
                .text()
                .await
                .map_err(|err| FetchError::Body(err.to_string()))
        }
        .boxed_local()
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Box<dyn Response>, FetchError>> {
        let client = self.client.clone();
        let parsed = parse_url(url);
        async move {
            let url = parsed?;
            debug!(target: "fetch", url = %url, "fetching");
            let response = client
                .get(url.clone())
                .send()
                .await
                .map_err(|err| FetchError::Network(err.to_string()))?;
            debug!(target: "fetch", url = %url, status = %response.status(), "response received");
            Ok(Box::new(HttpResponse(response)) as Box<dyn Response>)
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_urls_fail_before_any_request() {
        let fetcher = HttpFetcher::new(&RuntimeConfig::default()).unwrap();
        let err = match fetcher.fetch("not a url").await {
            Err(err) => err,
            Ok(_) => panic!("expected an invalid URL error"),
        };
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert!(err.to_string().contains("not a url"));
    }
}
