use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{rate_limiter, AlpacaCredentials, ApiRateLimiter, Broker};
use crate::config::TraderConfig;
use crate::error::BotError;
use crate::models::{Asset, OrderSide, OrderStatus};
use crate::Result;

/// Client for the Alpaca trading API (orders and account)
#[derive(Clone)]
pub struct AlpacaBrokerClient {
    client: Client,
    base_url: String,
    credentials: AlpacaCredentials,
    rate_limiter: Arc<ApiRateLimiter>,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    symbol: &'a str,
    qty: String,
    side: OrderSide,
    #[serde(rename = "type")]
    order_type: &'a str,
    time_in_force: &'a str,
    client_order_id: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    cash: String,
}

impl AlpacaBrokerClient {
    pub fn new(config: &TraderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.broker_url.trim_end_matches('/').to_string(),
            credentials: AlpacaCredentials {
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
            },
            rate_limiter: rate_limiter(config.rate_limit_per_minute),
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("accept", "application/json")
            .header("APCA-API-KEY-ID", &self.credentials.api_key)
            .header("APCA-API-SECRET-KEY", &self.credentials.api_secret)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self.authed(self.client.get(&url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Remote(format!(
                "broker API error on {} ({}): {}",
                path, status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Endpoint: GET /v2/assets?asset_class=crypto
    pub async fn list_crypto_assets(&self) -> Result<Vec<Asset>> {
        let mut assets: Vec<Asset> = self.get_json("/v2/assets?asset_class=crypto").await?;
        assets.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tracing::debug!(count = assets.len(), "Fetched crypto assets");
        Ok(assets)
    }
}

#[async_trait]
impl Broker for AlpacaBrokerClient {
    /// Endpoint: POST /v2/orders (market, good-til-cancelled)
    async fn submit_market_order(&self, symbol: &str, qty: f64, side: OrderSide) -> Result<String> {
        if !(qty > 0.0) || !qty.is_finite() {
            return Err(BotError::Order(format!("invalid quantity {}", qty)));
        }

        self.rate_limiter.until_ready().await;

        let request = OrderRequest {
            symbol,
            qty: qty.to_string(),
            side,
            order_type: "market",
            time_in_force: "gtc",
            client_order_id: Uuid::new_v4().to_string(),
        };

        let url = format!("{}/v2/orders", self.base_url);
        let response = self
            .authed(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::Order(format!("order request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Order(format!(
                "order rejected by broker ({}): {}",
                status, body
            )));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| BotError::Order(format!("malformed order response: {}", e)))?;

        tracing::info!(
            symbol = %symbol,
            side = %side,
            qty = qty,
            order_id = %order.id,
            status = %order.status,
            "Submitted market order"
        );

        Ok(order.id)
    }

    /// Endpoint: GET /v2/orders/{id}
    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus> {
        let order: OrderResponse = self.get_json(&format!("/v2/orders/{}", order_id)).await?;
        Ok(OrderStatus::parse(&order.status))
    }

    /// Endpoint: GET /v2/account
    async fn get_account_cash(&self) -> Result<f64> {
        let account: AccountResponse = self.get_json("/v2/account").await?;
        account
            .cash
            .parse::<f64>()
            .map_err(|e| BotError::Remote(format!("invalid cash value {:?}: {}", account.cash, e)))
    }
}
