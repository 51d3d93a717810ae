//! HTTP probing of track resources.
//!
//! Wraps `reqwest::Client` with the settings used to check whether a track
//! URL is reachable before it is put in rotation:
//! * every probe is bounded by a timeout;
//! * a `HEAD` request is tried first;
//! * servers that refuse `HEAD` get a one-byte ranged `GET`.
//!
//! Probes never fail: any error means "unreachable".

use std::time::Duration;

use reqwest::{
    header::{HeaderValue, RANGE},
    Method, StatusCode, Url,
};

use crate::error::Result;

#[derive(Clone)]
pub struct Client {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl Client {
    /// Duration to keep idle connections alive between probes.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Byte range requested by the fallback probe.
    const PROBE_RANGE: &'static str = "bytes=0-0";

    /// Creates a probe client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            timeout,
        })
    }

    /// Returns whether `url` looks servable.
    pub async fn probe(&self, url: &Url) -> bool {
        match self.head(url).await {
            Ok(true) => return true,
            Ok(false) => trace!("HEAD {url} refused, trying ranged GET"),
            Err(e) => trace!("HEAD {url} failed: {e}"),
        }

        match self.ranged_get(url).await {
            Ok(ok) => ok,
            Err(e) => {
                debug!("probe of {url} failed: {e}");
                false
            }
        }
    }

    async fn head(&self, url: &Url) -> Result<bool> {
        let request = self.http_client.request(Method::HEAD, url.clone()).send();
        let response = tokio::time::timeout(self.timeout, request).await??;
        Ok(response.status().is_success())
    }

    async fn ranged_get(&self, url: &Url) -> Result<bool> {
        let request = self
            .http_client
            .get(url.clone())
            .header(RANGE, HeaderValue::from_static(Self::PROBE_RANGE))
            .send();
        let response = tokio::time::timeout(self.timeout, request).await??;

        // 206 is ideal. A plain success means the server ignores ranges, which
        // is still playable.
        let status = response.status();
        Ok(status == StatusCode::PARTIAL_CONTENT || status.is_success())
    }
}
