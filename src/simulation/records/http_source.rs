use crate::simulation::records::provider::TripSource;
use crate::simulation::records::{ProviderError, RawTripPage, TripPage};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Number of attempts per page, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Exponential backoff: `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Fetches pages from `GET {base_url}/routes?start=<n>&end=<m>`.
pub struct HttpTripSource {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpTripSource {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        Ok(HttpTripSource {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn page_url(&self, start: usize, end: usize) -> String {
        format!("{}/routes?start={start}&end={end}", self.base_url)
    }

    async fn fetch_once(&self, url: &str) -> Result<TripPage, ProviderError> {
        let unavailable = |e: reqwest::Error| ProviderError::Unavailable(e.to_string());
        let page: RawTripPage = self
            .client
            .get(url)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;
        TripPage::try_from(page)
    }
}

impl TripSource for HttpTripSource {
    async fn fetch_page(&mut self, start: usize, end: usize) -> Result<TripPage, ProviderError> {
        let url = self.page_url(start, end);
        let mut attempt = 0;
        loop {
            match self.fetch_once(&url).await {
                Ok(page) => return Ok(page),
                Err(e) if attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!("Request {url} failed (attempt {}): {e}. Retrying in {delay:?}", attempt + 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
