use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response};

use crate::{error::ConnectorResult, ratelimit::RateLimiter};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// What the connector needs from whatever is hosting it: fetch a page, post a form.
///
/// Bodies are returned as text; the cookie jar lives behind the implementation.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> ConnectorResult<String>;

    /// POSTs `form` as `application/x-www-form-urlencoded`.
    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> ConnectorResult<String>;
}

pub struct RequestClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl RequestClient {
    pub fn new() -> ConnectorResult<Self> {
        let client = ClientBuilder::new()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .build()?;
        let rate_limiter = RateLimiter::new();
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    async fn fetch_url_response(&self, url: &str) -> ConnectorResult<Response> {
        // Wait (non-blocking) until our self-imposed rate limit lets us through.
        self.rate_limiter.wait_until_ready().await;

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response)
    }
}

#[async_trait]
impl HttpTransport for RequestClient {
    async fn get(&self, url: &str) -> ConnectorResult<String> {
        let response = self.fetch_url_response(url).await?;
        let body = response.text().await?;
        Ok(body)
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        form: &[(&str, &str)],
    ) -> ConnectorResult<String> {
        self.rate_limiter.wait_until_ready().await;

        let mut request = self.client.post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?.error_for_status()?;
        let body = response.text().await?;
        Ok(body)
    }
}
