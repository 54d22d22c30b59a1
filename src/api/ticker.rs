use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::TradeError;
use crate::models::PriceSnapshot;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

type TickerRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for the exchange's public (unauthenticated) ticker endpoint.
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct TickerClient {
    client: Client,
    base_url: String,
    product_id: String,
    rate_limiter: Arc<TickerRateLimiter>,
    initial_backoff: Duration,
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    price: String,
    #[serde(default)]
    time: Option<DateTime<Utc>>,
}

impl TickerClient {
    pub fn new(
        base_url: String,
        product_id: String,
        requests_per_minute: u32,
        request_timeout: Duration,
    ) -> Result<Self, TradeError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            product_id,
            rate_limiter,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        })
    }

    /// Override the first retry delay (doubles on every further attempt)
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    /// Latest traded price, retrying transient failures with exponential backoff
    pub async fn fetch_price(&self) -> Result<PriceSnapshot, TradeError> {
        let mut attempt = 1;

        loop {
            match self.fetch_price_once().await {
                Ok(snapshot) => {
                    if attempt > 1 {
                        tracing::info!(
                            "Fetched {} ticker after {} attempts",
                            self.product_id,
                            attempt
                        );
                    }
                    return Ok(snapshot);
                }
                Err(e) if attempt < MAX_RETRIES && is_retryable(&e) => {
                    let backoff = self.initial_backoff * 2_u32.pow(attempt - 1);
                    tracing::warn!(
                        "Ticker attempt {}/{} failed for {}: {}. Retrying in {:?}...",
                        attempt,
                        MAX_RETRIES,
                        self.product_id,
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_price_once(&self) -> Result<PriceSnapshot, TradeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/products/{}/ticker", self.base_url, self.product_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(TradeError::Gateway(format!("ticker returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradeError::Rejected(format!(
                "ticker returned {}: {}",
                status, body
            )));
        }

        let ticker: TickerResponse = response.json().await?;
        let price: f64 = ticker
            .price
            .parse()
            .map_err(|_| TradeError::Parse(format!("invalid ticker price '{}'", ticker.price)))?;

        Ok(PriceSnapshot {
            product_id: self.product_id.clone(),
            price,
            timestamp: ticker.time.unwrap_or_else(Utc::now),
        })
    }
}

fn is_retryable(error: &TradeError) -> bool {
    matches!(error, TradeError::Http(_) | TradeError::Gateway(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> TickerClient {
        TickerClient::new(
            server.url(),
            "BTC-EUR".to_string(),
            600,
            Duration::from_secs(2),
        )
        .unwrap()
        .with_initial_backoff(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_parses_ticker_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/products/BTC-EUR/ticker")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"trade_id": 86326522, "price": "26400.17", "size": "0.002", "time": "2024-03-01T10:00:00.123456Z"}"#)
            .create_async()
            .await;

        let snapshot = client_for(&server).fetch_price().await.unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.product_id, "BTC-EUR");
        assert_eq!(snapshot.price, 26400.17);
        assert_eq!(snapshot.timestamp.to_rfc3339(), "2024-03-01T10:00:00.123456+00:00");
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/products/BTC-EUR/ticker")
            .with_status(503)
            .expect(MAX_RETRIES as usize)
            .create_async()
            .await;

        let result = client_for(&server).fetch_price().await;

        mock.assert_async().await;
        assert!(matches!(result, Err(TradeError::Gateway(_))));
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/products/BTC-EUR/ticker")
            .with_status(404)
            .with_body(r#"{"message": "NotFound"}"#)
            .expect(1)
            .create_async()
            .await;

        let result = client_for(&server).fetch_price().await;

        mock.assert_async().await;
        match result {
            Err(TradeError::Rejected(message)) => assert!(message.contains("NotFound")),
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_price_is_a_parse_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/products/BTC-EUR/ticker")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"price": "n/a"}"#)
            .create_async()
            .await;

        let result = client_for(&server).fetch_price().await;
        assert!(matches!(result, Err(TradeError::Parse(_))));
    }
}
