use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::{rate_limiter, AlpacaCredentials, ApiRateLimiter, MarketData};
use crate::config::TraderConfig;
use crate::error::BotError;
use crate::models::Bar;
use crate::Result;

/// Client for the Alpaca crypto market-data API
///
/// Cloneable; all clones share the HTTP connection pool and rate limiter.
#[derive(Clone)]
pub struct AlpacaMarketDataClient {
    client: Client,
    bars_url: String,
    quotes_url: String,
    credentials: AlpacaCredentials,
    rate_limiter: Arc<ApiRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct BarsResponse {
    bars: HashMap<String, Vec<Bar>>,
}

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    quotes: HashMap<String, QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(rename = "ap")]
    ask_price: f64,
}

// ============== Implementation ==============

impl AlpacaMarketDataClient {
    pub fn new(config: &TraderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            bars_url: config.bars_url.clone(),
            quotes_url: config.quotes_url.clone(),
            credentials: AlpacaCredentials {
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
            },
            rate_limiter: rate_limiter(config.rate_limit_per_minute),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .query(query)
            .header("accept", "application/json")
            .header("APCA-API-KEY-ID", &self.credentials.api_key)
            .header("APCA-API-SECRET-KEY", &self.credentials.api_secret)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Remote(format!(
                "market data API error ({}): {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MarketData for AlpacaMarketDataClient {
    /// Endpoint: GET {bars_url}?symbols=..&timeframe=..&start=..&end=..&limit=..&sort=asc
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Bar>> {
        let query = [
            ("symbols", symbol.to_string()),
            ("timeframe", timeframe.to_string()),
            ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("limit", limit.to_string()),
            ("sort", "asc".to_string()),
        ];

        let mut response: BarsResponse = self.get_json(&self.bars_url, &query).await?;

        let mut bars = response.bars.remove(symbol).ok_or_else(|| {
            BotError::Remote(format!("symbol {} not found in bars response", symbol))
        })?;
        bars.sort_by_key(|b| b.timestamp);

        tracing::debug!(symbol = %symbol, count = bars.len(), "Fetched bars");
        Ok(bars)
    }

    /// Endpoint: GET {quotes_url}?symbols=..
    async fn get_last_price(&self, symbol: &str) -> Result<f64> {
        let query = [("symbols", symbol.to_string())];
        let response: QuotesResponse = self.get_json(&self.quotes_url, &query).await?;

        let quote = response.quotes.get(symbol).ok_or_else(|| {
            BotError::Remote(format!("symbol {} not found in quotes response", symbol))
        })?;

        Ok(quote.ask_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn test_config(base: &str) -> TraderConfig {
        let json = format!(
            r#"{{
                "api_key": "key",
                "api_secret": "secret",
                "bars_url": "{base}/bars",
                "quotes_url": "{base}/latest/quotes",
                "symbols": ["BTC/USD"],
                "max_drawdown_pct": 2.0,
                "break_even_trigger_pct": 1.0,
                "take_profit_ratio_pct": 3.0
            }}"#
        );
        TraderConfig::from_json_str(&json).unwrap()
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_get_bars_parses_and_sorts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bars")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbols".into(), "BTC/USD".into()),
                Matcher::UrlEncoded("timeframe".into(), "1Hour".into()),
                Matcher::UrlEncoded("start".into(), "2024-05-01T00:00:00Z".into()),
                Matcher::UrlEncoded("limit".into(), "500".into()),
                Matcher::UrlEncoded("sort".into(), "asc".into()),
            ]))
            .match_header("APCA-API-KEY-ID", "key")
            .match_header("APCA-API-SECRET-KEY", "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"bars":{"BTC/USD":[
                    {"t":"2024-05-01T02:00:00Z","o":3,"h":4,"l":2,"c":3,"v":1,"vw":3},
                    {"t":"2024-05-01T01:00:00Z","o":2,"h":3,"l":1,"c":2,"v":1,"vw":2}
                ]},"next_page_token":null}"#,
            )
            .create_async()
            .await;

        let client = AlpacaMarketDataClient::new(&test_config(&server.url())).unwrap();
        let (start, end) = window();
        let bars = client
            .get_bars("BTC/USD", "1Hour", start, end, 500)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
        assert_eq!(bars[0].high, 3.0);
    }

    #[tokio::test]
    async fn test_get_bars_missing_symbol_is_remote_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bars")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"bars":{}}"#)
            .create_async()
            .await;

        let client = AlpacaMarketDataClient::new(&test_config(&server.url())).unwrap();
        let (start, end) = window();
        let err = client
            .get_bars("BTC/USD", "1Hour", start, end, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Remote(_)));
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_get_bars_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bars")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("forbidden")
            .create_async()
            .await;

        let client = AlpacaMarketDataClient::new(&test_config(&server.url())).unwrap();
        let (start, end) = window();
        let err = client
            .get_bars("BTC/USD", "1Hour", start, end, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Remote(_)));
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_remote_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/latest/quotes")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = AlpacaMarketDataClient::new(&test_config(&server.url())).unwrap();
        let err = client.get_last_price("BTC/USD").await.unwrap_err();
        assert!(matches!(err, BotError::Remote(_)));
    }

    #[tokio::test]
    async fn test_get_last_price_reads_ask() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/latest/quotes")
            .match_query(Matcher::UrlEncoded("symbols".into(), "ETH/USD".into()))
            .with_status(200)
            .with_body(r#"{"quotes":{"ETH/USD":{"ap":3150.25,"as":1.2,"bp":3149.5,"bs":0.8,"t":"2024-05-01T00:00:00Z"}}}"#)
            .create_async()
            .await;

        let client = AlpacaMarketDataClient::new(&test_config(&server.url())).unwrap();
        let price = client.get_last_price("ETH/USD").await.unwrap();
        assert_eq!(price, 3150.25);
    }
}
