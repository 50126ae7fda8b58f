use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use tracing::{debug, error};

use common::models::{Instrument, OrderReceipt, OrderSide};

use crate::Brokerage;
use crate::error::BrokerageError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<Instrument>,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    price: f64,
}

#[derive(Debug, Deserialize)]
struct PositionResponse {
    quantity: u64,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    funds: f64,
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    orders: Vec<OrderReceipt>,
}

#[derive(Debug, Deserialize)]
struct MarketClockResponse {
    next_open: i64,
    next_close: i64,
}

/// REST client for the brokerage API. Market-data endpoints are public;
/// account and order endpoints are authenticated with an HMAC-SHA256
/// signature over the query string.
#[derive(Clone)]
pub struct RestBrokerage {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
}

impl RestBrokerage {
    pub fn new() -> Self {
        let api_key = env::var("BROKERAGE_API_KEY").expect("BROKERAGE_API_KEY not set");
        let secret_key = env::var("BROKERAGE_SECRET_KEY").expect("BROKERAGE_SECRET_KEY not set");
        let base_url = env::var("BROKERAGE_BASE_URL")
            .unwrap_or_else(|_| "https://paper.lemonade.markets".to_string());

        Self {
            client: Client::new(),
            base_url,
            api_key,
            secret_key,
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    async fn check(resp: Response, path: &str) -> Result<Response, BrokerageError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        error!("brokerage request {} failed ({}): {}", path, status, body);
        Err(BrokerageError::Api { status, body })
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, BrokerageError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(params).send().await?;
        Ok(Self::check(resp, path).await?.json::<T>().await?)
    }

    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &str,
    ) -> Result<Response, BrokerageError> {
        let query = if params.is_empty() {
            format!("timestamp={}", Self::timestamp_ms())
        } else {
            format!("{}&timestamp={}", params, Self::timestamp_ms())
        };
        let signature = self.sign(&query);
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let resp = self
            .client
            .request(method, &url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await?;
        Self::check(resp, path).await
    }

    async fn signed_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &str,
    ) -> Result<T, BrokerageError> {
        Ok(self.signed(method, path, params).await?.json::<T>().await?)
    }

    async fn place_order(
        &self,
        instrument: &Instrument,
        side: OrderSide,
        quantity: u64,
    ) -> Result<OrderReceipt, BrokerageError> {
        debug!("placing order: {} {} {}", side, quantity, instrument.name);
        let params = format!(
            "isin={}&side={}&quantity={}",
            instrument.isin, side, quantity
        );
        self.signed_json(Method::POST, "/v1/orders", &params).await
    }

    fn to_datetime(epoch_secs: i64) -> Result<DateTime<Utc>, BrokerageError> {
        DateTime::from_timestamp(epoch_secs, 0).ok_or_else(|| {
            BrokerageError::Malformed(format!("market clock timestamp {}", epoch_secs))
        })
    }

    async fn market_clock(&self) -> Result<MarketClockResponse, BrokerageError> {
        self.public_get("/v1/market/clock", &[]).await
    }
}

#[async_trait]
impl Brokerage for RestBrokerage {
    async fn search_by_name(&self, query: &str) -> Result<Option<Instrument>, BrokerageError> {
        let resp: SearchResponse = self
            .public_get("/v1/instruments", &[("query", query), ("kind", "name")])
            .await?;
        Ok(resp.results.into_iter().next())
    }

    async fn search_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>, BrokerageError> {
        let resp: SearchResponse = self
            .public_get("/v1/instruments", &[("query", symbol), ("kind", "symbol")])
            .await?;
        Ok(resp
            .results
            .into_iter()
            .find(|instrument| instrument.symbol.as_deref() == Some(symbol)))
    }

    async fn latest_price(&self, instrument: &Instrument) -> Result<f64, BrokerageError> {
        let resp: QuoteResponse = self
            .public_get("/v1/quotes", &[("isin", instrument.isin.as_str())])
            .await?;
        Ok(resp.price)
    }

    async fn place_buy_order(
        &self,
        instrument: &Instrument,
        quantity: u64,
    ) -> Result<OrderReceipt, BrokerageError> {
        self.place_order(instrument, OrderSide::Buy, quantity).await
    }

    async fn place_sell_order(
        &self,
        instrument: &Instrument,
        quantity: u64,
    ) -> Result<OrderReceipt, BrokerageError> {
        self.place_order(instrument, OrderSide::Sell, quantity)
            .await
    }

    async fn held_quantity(&self, instrument: &Instrument) -> Result<u64, BrokerageError> {
        let params = format!("isin={}", instrument.isin);
        let resp: PositionResponse = self
            .signed_json(Method::GET, "/v1/positions", &params)
            .await?;
        Ok(resp.quantity)
    }

    async fn open_orders(&self) -> Result<Vec<OrderReceipt>, BrokerageError> {
        let resp: OrdersResponse = self
            .signed_json(Method::GET, "/v1/orders", "status=open")
            .await?;
        Ok(resp.orders)
    }

    async fn cancel_order(&self, order: &OrderReceipt) -> Result<(), BrokerageError> {
        let path = format!("/v1/orders/{}", order.order_id);
        self.signed(Method::DELETE, &path, "").await?;
        Ok(())
    }

    async fn available_funds(&self) -> Result<f64, BrokerageError> {
        let resp: AccountResponse = self.signed_json(Method::GET, "/v1/account", "").await?;
        Ok(resp.funds)
    }

    async fn next_market_close(&self) -> Result<DateTime<Utc>, BrokerageError> {
        let clock = self.market_clock().await?;
        Self::to_datetime(clock.next_close)
    }

    async fn next_market_open(&self) -> Result<DateTime<Utc>, BrokerageError> {
        let clock = self.market_clock().await?;
        Self::to_datetime(clock.next_open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_secret(secret: &str) -> RestBrokerage {
        RestBrokerage {
            client: Client::new(),
            base_url: "https://paper.invalid".to_string(),
            api_key: "key".to_string(),
            secret_key: secret.to_string(),
        }
    }

    #[test]
    fn signature_is_hex_and_keyed() {
        let a = client_with_secret("alpha");
        let b = client_with_secret("beta");

        let sig = a.sign("timestamp=1700000000000");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(sig, a.sign("timestamp=1700000000000"));
        assert_ne!(sig, b.sign("timestamp=1700000000000"));
        assert_ne!(sig, a.sign("timestamp=1700000000001"));
    }

    #[test]
    fn deserializes_search_results() {
        let raw = r#"{"results":[{"isin":"US0378331005","symbol":"AAPL","name":"Apple Inc"}]}"#;
        let resp: SearchResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].symbol.as_deref(), Some("AAPL"));
        assert_eq!(resp.results[0].name, "Apple Inc");
    }

    #[test]
    fn deserializes_order_receipt() {
        let raw = r#"{"orders":[{"order_id":"ord-1","isin":"US0378331005","side":"BUY","quantity":2,"status":"open"}]}"#;
        let resp: OrdersResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(resp.orders[0].side, OrderSide::Buy);
        assert_eq!(resp.orders[0].quantity, 2);
    }

    #[test]
    fn converts_market_clock_timestamps() {
        let raw = r#"{"next_open":1700000000,"next_close":1700023400}"#;
        let clock: MarketClockResponse = serde_json::from_str(raw).unwrap();

        let close = RestBrokerage::to_datetime(clock.next_close).unwrap();
        let open = RestBrokerage::to_datetime(clock.next_open).unwrap();
        assert_eq!((close - open).num_seconds(), 23_400);
    }
}
