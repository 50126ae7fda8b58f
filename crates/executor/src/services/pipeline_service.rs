use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use common::models::{StreamPost, TradeDirection};
use signal::SignalExtractor;
use social_stream::PostHandler;

use crate::services::trade_service::TradeDecisionEngine;

/// Glue between the stream workers and the trading core: extract a signal
/// from the post, then run one directive per surviving candidate.
pub struct PipelineService {
    extractor: SignalExtractor,
    engine: Arc<TradeDecisionEngine>,
    verbose: bool,
}

impl PipelineService {
    pub fn new(extractor: SignalExtractor, engine: Arc<TradeDecisionEngine>, verbose: bool) -> Self {
        Self {
            extractor,
            engine,
            verbose,
        }
    }
}

#[async_trait]
impl PostHandler for PipelineService {
    async fn handle(&self, post: StreamPost) -> Result<()> {
        let signal = self.extractor.extract(&post.text, &post.cashtags).await;

        let Some(direction) = TradeDirection::from_sentiment(signal.sentiment) else {
            debug!("no sentiment in post from {}", post.author_id);
            return Ok(());
        };
        if signal.candidates.is_empty() {
            debug!("no candidates in post from {}", post.author_id);
            return Ok(());
        }

        if self.verbose {
            info!(
                "\"{}\": {:?} with sentiment {:.3} across {} candidate(s)",
                post.text,
                direction,
                signal.sentiment,
                signal.candidates.len()
            );
            for candidate in &signal.candidates {
                info!(
                    "  {} (confidence {:.3}, weight {:.2})",
                    candidate.instrument.name,
                    candidate.confidence,
                    candidate.weight()
                );
            }
        }

        for candidate in &signal.candidates {
            match self.engine.execute(&candidate.instrument, direction).await {
                Ok(directive) => info!(
                    "{:?} directive on {} executed with quantity {}",
                    directive.direction, directive.instrument.name, directive.quantity
                ),
                Err(err) => warn!("directive on {} failed: {}", candidate.instrument.name, err),
            }
        }
        Ok(())
    }
}
