use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{error, info};

use brokerage::{Brokerage, RestBrokerage};
use common::config::Config;
use common::logger;
use common::scheduler::TaskRegistry;
use signal::SignalExtractor;
use social_stream::{FailurePolicy, StreamDispatcher, WorkerPool};

use crate::services::pipeline_service::PipelineService;
use crate::services::shutdown_service::ShutdownCoordinator;
use crate::services::trade_service::TradeDecisionEngine;

mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Config::from_env()?;
    logger::setup_logger(config.verbose);
    info!("system starting up");

    let brokerage: Arc<dyn Brokerage> = Arc::new(RestBrokerage::new());

    let initial_funds = brokerage
        .available_funds()
        .await
        .context("could not read account funds")?;
    info!("available funds: {:.2}", initial_funds);

    let registry = TaskRegistry::new();
    let engine = Arc::new(TradeDecisionEngine::new(
        Arc::clone(&brokerage),
        registry.clone(),
        config.spend_limit,
        config.lead_time_secs,
        config.liquidate_all,
    ));
    let extractor = SignalExtractor::new(Arc::clone(&brokerage))
        .with_match_cutoff(config.match_cutoff)
        .with_weight_cutoff(config.weight_cutoff)
        .with_min_span_length(config.min_span_length)
        .with_denylist(config.instrument_denylist.clone());
    let handler = Arc::new(PipelineService::new(extractor, engine, config.verbose));

    let policy = if config.verbose {
        FailurePolicy::LogFull
    } else {
        FailurePolicy::Silent
    };
    let pool = WorkerPool::new(config.workers, config.queue_depth, handler, policy);
    let mut dispatcher =
        StreamDispatcher::new(&config.stream_url, config.author_allowlist.clone(), pool);

    let coordinator = ShutdownCoordinator::new(
        Arc::clone(&brokerage),
        registry.clone(),
        initial_funds,
        config.verbose,
    );

    info!("opening stream; press Ctrl-C to stop");
    let outcome = tokio::select! {
        result = dispatcher.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping");
            Ok(())
        }
    };
    if let Err(err) = &outcome {
        error!("stream failed: {}", err);
    }

    dispatcher.close().await;
    coordinator.run().await;

    Ok(outcome?)
}
