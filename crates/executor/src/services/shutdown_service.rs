use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, warn};

use brokerage::Brokerage;
use common::scheduler::TaskRegistry;

/// Final cleanup pass over the account and the deferred-task registry.
/// Runs exactly once; every step is best-effort and a failure in one never
/// blocks the next.
pub struct ShutdownCoordinator {
    brokerage: Arc<dyn Brokerage>,
    registry: TaskRegistry,
    initial_funds: f64,
    verbose: bool,
    completed: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(
        brokerage: Arc<dyn Brokerage>,
        registry: TaskRegistry,
        initial_funds: f64,
        verbose: bool,
    ) -> Self {
        Self {
            brokerage,
            registry,
            initial_funds,
            verbose,
            completed: AtomicBool::new(false),
        }
    }

    pub async fn run(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down: resolving open orders and deferred tasks");

        self.cancel_open_orders().await;
        self.resolve_deferred_tasks().await;
        if self.verbose {
            self.report_funds().await;
        }
    }

    async fn cancel_open_orders(&self) {
        match self.brokerage.open_orders().await {
            Ok(orders) => {
                for order in orders {
                    if let Err(err) = self.brokerage.cancel_order(&order).await {
                        warn!("failed to cancel order {}: {}", order.order_id, err);
                    }
                }
            }
            Err(err) => error!("could not list open orders: {}", err),
        }
    }

    async fn resolve_deferred_tasks(&self) {
        let tasks = self.registry.drain();
        info!("resolving {} outstanding deferred task(s)", tasks.len());

        for task in tasks {
            if let Err(err) = task.force_execute().await {
                warn!("forced execution of task {} failed ({}), cancelling", task.id(), err);
                task.cancel();
            }
        }
    }

    async fn report_funds(&self) {
        match self.brokerage.available_funds().await {
            Ok(funds) => {
                let delta = funds - self.initial_funds;
                let percent = if self.initial_funds != 0.0 {
                    delta / self.initial_funds * 100.0
                } else {
                    0.0
                };
                info!("funds changed by {:+.2} ({:+.3}%)", delta, percent);
            }
            Err(err) => warn!("could not read final funds: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use brokerage::MockBrokerage;
    use brokerage::error::BrokerageError;
    use common::models::{OrderReceipt, OrderSide};
    use common::scheduler::DeferredTask;
    use futures_util::FutureExt;

    fn open_order() -> OrderReceipt {
        OrderReceipt {
            order_id: "ord-7".to_string(),
            isin: "US0378331005".to_string(),
            side: OrderSide::Buy,
            quantity: 2,
            status: "open".to_string(),
        }
    }

    #[tokio::test]
    async fn resolves_orders_and_tasks_exactly_once() {
        let mut mock = MockBrokerage::new();
        mock.expect_open_orders()
            .times(1)
            .returning(|| Ok(vec![open_order()]));
        mock.expect_cancel_order().times(1).returning(|_| Ok(()));
        mock.expect_available_funds().times(1).returning(|| Ok(95.0));

        let registry = TaskRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let fine = Arc::clone(&counter);
        registry.register(DeferredTask::schedule(Duration::from_secs(3600), move || {
            async move {
                fine.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }));
        registry.register(DeferredTask::schedule(Duration::from_secs(3600), || {
            async { panic!("deferred action blew up") }.boxed()
        }));

        let coordinator =
            ShutdownCoordinator::new(Arc::new(mock), registry.clone(), 100.0, true);

        coordinator.run().await;
        // second run is a no-op; the mocks would panic on extra calls
        coordinator.run().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn order_listing_failure_does_not_stop_task_resolution() {
        let mut mock = MockBrokerage::new();
        mock.expect_open_orders().times(1).returning(|| {
            Err(BrokerageError::Api {
                status: 500,
                body: "listing broken".to_string(),
            })
        });

        let registry = TaskRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let ran = Arc::clone(&counter);
        registry.register(DeferredTask::schedule(Duration::from_secs(3600), move || {
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }));

        let coordinator =
            ShutdownCoordinator::new(Arc::new(mock), registry.clone(), 100.0, false);
        coordinator.run().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pending_count(), 0);
    }
}
