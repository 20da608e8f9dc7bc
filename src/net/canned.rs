use std::cell::RefCell;
use std::collections::HashMap;

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;

use super::{parse_url, Fetch, FetchError, Response};

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    BrokenBody(String),
    Failure(String),
}

/// Fetcher answering from a fixed table of URLs. Every call is recorded.
#[derive(Default)]
pub struct StaticFetch {
    replies: RefCell<HashMap<String, Reply>>,
    calls: RefCell<Vec<String>>,
}

impl StaticFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, body: impl Into<String>) -> &Self {
        self.replies
            .borrow_mut()
            .insert(url.to_string(), Reply::Body(body.into()));
        self
    }

    /// The request succeeds but reading the body fails with `message`.
    pub fn respond_with_broken_body(&self, url: &str, message: impl Into<String>) -> &Self {
        self.replies
            .borrow_mut()
            .insert(url.to_string(), Reply::BrokenBody(message.into()));
        self
    }

    pub fn fail(&self, url: &str, message: impl Into<String>) -> &Self {
        self.replies
            .borrow_mut()
            .insert(url.to_string(), Reply::Failure(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

struct CannedResponse(Result<String, String>);

impl Response for CannedResponse {
    fn status(&self) -> u16 {
        200
    }

    fn text(self: Box<Self>) -> LocalBoxFuture<'static, Result<String, FetchError>> {
        let body = self.0.map_err(FetchError::Body);
        async move { body }.boxed_local()
    }
}

impl Fetch for StaticFetch {
    fn fetch(&self, url: &str) -> LocalBoxFuture<'static, Result<Box<dyn Response>, FetchError>> {
        self.calls.borrow_mut().push(url.to_string());
        let reply = self.replies.borrow().get(url).cloned();
        let parsed = parse_url(url).map(|_| ());
        let url = url.to_string();
        async move {
            parsed?;
            tokio::task::yield_now().await;
            match reply {
                Some(Reply::Body(body)) => Ok(Box::new(CannedResponse(Ok(body))) as Box<dyn Response>),
                Some(Reply::BrokenBody(message)) => {
                    Ok(Box::new(CannedResponse(Err(message))) as Box<dyn Response>)
                }
                Some(Reply::Failure(message)) => Err(FetchError::Network(message)),
                None => Err(FetchError::Network(format!("no response registered for {url}"))),
            }
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_from_the_table_and_records_calls() {
        let fetch = StaticFetch::new();
        fetch
            .respond("https://example.com/a", "alpha")
            .fail("https://example.com/b", "connection refused");

        let body = match fetch.fetch("https://example.com/a").await {
            Ok(response) => response.text().await.unwrap(),
            Err(err) => panic!("unexpected error: {err}"),
        };
        assert_eq!(body, "alpha");
        assert!(matches!(
            fetch.fetch("https://example.com/b").await,
            Err(FetchError::Network(message)) if message == "connection refused"
        ));
        assert!(fetch.fetch("https://example.com/c").await.is_err());
        assert_eq!(fetch.calls().len(), 3);
    }
}
