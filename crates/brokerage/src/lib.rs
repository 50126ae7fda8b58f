pub mod client;
pub mod error;

pub use client::RestBrokerage;
pub use error::BrokerageError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::models::{Instrument, OrderReceipt};

/// Capabilities the pipeline consumes from the brokerage/market-data
/// provider. Every call is a fresh remote request and may fail with a
/// transport or API error; nothing is cached on this side.
#[cfg_attr(feature = "mocks", mockall::automock)]
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Fuzzy lookup by display name. `None` when nothing matches.
    async fn search_by_name(&self, query: &str) -> Result<Option<Instrument>, BrokerageError>;

    /// Exact lookup by ticker symbol, no fuzzy matching.
    async fn search_by_symbol(&self, symbol: &str) -> Result<Option<Instrument>, BrokerageError>;

    async fn latest_price(&self, instrument: &Instrument) -> Result<f64, BrokerageError>;

    async fn place_buy_order(
        &self,
        instrument: &Instrument,
        quantity: u64,
    ) -> Result<OrderReceipt, BrokerageError>;

    async fn place_sell_order(
        &self,
        instrument: &Instrument,
        quantity: u64,
    ) -> Result<OrderReceipt, BrokerageError>;

    async fn held_quantity(&self, instrument: &Instrument) -> Result<u64, BrokerageError>;

    async fn open_orders(&self) -> Result<Vec<OrderReceipt>, BrokerageError>;

    async fn cancel_order(&self, order: &OrderReceipt) -> Result<(), BrokerageError>;

    async fn available_funds(&self) -> Result<f64, BrokerageError>;

    async fn next_market_close(&self) -> Result<DateTime<Utc>, BrokerageError>;

    async fn next_market_open(&self) -> Result<DateTime<Utc>, BrokerageError>;
}
