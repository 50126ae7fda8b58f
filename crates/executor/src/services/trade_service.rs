use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use brokerage::{Brokerage, BrokerageError};
use common::models::{Instrument, TradeDirection, TradeDirective};
use common::scheduler::{DeferredTask, TaskRegistry};

#[derive(Debug, Error)]
pub enum TradeError {
    #[error("instrument price exceeds the spend limit")]
    PriceExceedsLimit,
    #[error("too close to market close")]
    TooCloseToClose,
    #[error("market is closed")]
    MarketClosed,
    #[error("too far from market open")]
    TooFarFromOpen,
    #[error("market lookup failed: {0}")]
    Lookup(#[source] BrokerageError),
    #[error("order placement failed: {0}")]
    OrderPlacement(#[source] BrokerageError),
}

/// Runs one bull/bear directive to completion: market-hours gating,
/// quantity sizing, the immediate order, and the deferred counter-order.
/// At most two orders ever come out of one directive.
pub struct TradeDecisionEngine {
    brokerage: Arc<dyn Brokerage>,
    registry: TaskRegistry,
    spend_limit: f64,
    lead_time_secs: i64,
    liquidate_all: bool,
}

impl TradeDecisionEngine {
    pub fn new(
        brokerage: Arc<dyn Brokerage>,
        registry: TaskRegistry,
        spend_limit: f64,
        lead_time_secs: i64,
        liquidate_all: bool,
    ) -> Self {
        Self {
            brokerage,
            registry,
            spend_limit,
            lead_time_secs,
            liquidate_all,
        }
    }

    pub async fn execute(
        &self,
        instrument: &Instrument,
        direction: TradeDirection,
    ) -> Result<TradeDirective, TradeError> {
        let quantity = self.quantity_for(instrument).await?;
        let time_to_close = self.gate_market_hours().await?;
        let delay = Duration::from_secs((time_to_close - self.lead_time_secs).max(0) as u64);

        match direction {
            TradeDirection::Bull => self.bull(instrument, quantity, delay).await?,
            TradeDirection::Bear => self.bear(instrument, quantity, delay).await?,
        }

        Ok(TradeDirective {
            instrument: instrument.clone(),
            direction,
            quantity,
        })
    }

    async fn quantity_for(&self, instrument: &Instrument) -> Result<u64, TradeError> {
        let price = self
            .brokerage
            .latest_price(instrument)
            .await
            .map_err(TradeError::Lookup)?;

        // fractional shares are not supported
        let quantity = if price <= 0.0 {
            1
        } else {
            (self.spend_limit / price).floor() as i64
        };
        if quantity <= 0 {
            return Err(TradeError::PriceExceedsLimit);
        }
        Ok(quantity as u64)
    }

    /// Checks both market-hour gates and returns seconds until the next
    /// close when trading is allowed.
    async fn gate_market_hours(&self) -> Result<i64, TradeError> {
        let now = Utc::now();

        let close = self
            .brokerage
            .next_market_close()
            .await
            .map_err(TradeError::Lookup)?;
        let time_to_close = (close - now).num_seconds();
        if time_to_close < self.lead_time_secs {
            return Err(if time_to_close > 0 {
                TradeError::TooCloseToClose
            } else {
                TradeError::MarketClosed
            });
        }

        let open = self
            .brokerage
            .next_market_open()
            .await
            .map_err(TradeError::Lookup)?;
        let time_to_open = (open - now).num_seconds();
        if time_to_open > self.lead_time_secs {
            return Err(TradeError::TooFarFromOpen);
        }

        Ok(time_to_close)
    }

    /// Buy now, sell back shortly before the close.
    async fn bull(
        &self,
        instrument: &Instrument,
        quantity: u64,
        delay: Duration,
    ) -> Result<(), TradeError> {
        self.brokerage
            .place_buy_order(instrument, quantity)
            .await
            .map_err(TradeError::OrderPlacement)?;
        info!("bull entry: bought {} x {}", quantity, instrument.name);

        let brokerage = Arc::clone(&self.brokerage);
        let instrument = instrument.clone();
        let liquidate_all = self.liquidate_all;
        let task = DeferredTask::schedule(delay, move || {
            async move {
                let sell_quantity = if liquidate_all {
                    // the position may have changed since the buy; sell
                    // whatever is actually held right now
                    match brokerage.held_quantity(&instrument).await {
                        Ok(held) => held,
                        Err(err) => {
                            warn!(
                                "holding lookup for deferred sell of {} failed: {}",
                                instrument.name, err
                            );
                            return;
                        }
                    }
                } else {
                    quantity
                };
                if sell_quantity == 0 {
                    debug!("nothing held, skipping deferred sell of {}", instrument.name);
                    return;
                }
                if let Err(err) = brokerage.place_sell_order(&instrument, sell_quantity).await {
                    warn!(
                        "deferred sell of {} x {} failed: {}",
                        sell_quantity, instrument.name, err
                    );
                }
            }
            .boxed()
        });
        self.registry.register(task);
        Ok(())
    }

    /// Sell what is held now, buy back shortly before the close.
    async fn bear(
        &self,
        instrument: &Instrument,
        quantity: u64,
        delay: Duration,
    ) -> Result<(), TradeError> {
        let held = self
            .brokerage
            .held_quantity(instrument)
            .await
            .map_err(TradeError::Lookup)?;
        let sell_quantity = if self.liquidate_all {
            held
        } else {
            quantity.min(held)
        };

        self.brokerage
            .place_sell_order(instrument, sell_quantity)
            .await
            .map_err(TradeError::OrderPlacement)?;
        info!("bear entry: sold {} x {}", sell_quantity, instrument.name);

        let brokerage = Arc::clone(&self.brokerage);
        let instrument = instrument.clone();
        let task = DeferredTask::schedule(delay, move || {
            async move {
                if let Err(err) = brokerage.place_buy_order(&instrument, quantity).await {
                    warn!(
                        "deferred buy of {} x {} failed: {}",
                        quantity, instrument.name, err
                    );
                }
            }
            .boxed()
        });
        self.registry.register(task);
        Ok(())
    }
}
