use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use common::models::StreamPost;

/// Processes one post. Implemented by the trading pipeline; the pool never
/// cares what handling means.
#[async_trait]
pub trait PostHandler: Send + Sync {
    async fn handle(&self, post: StreamPost) -> Result<()>;
}

/// What a worker does with a failed post. Injected at pool construction; a
/// failing post never stops the worker or its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the full error chain.
    LogFull,
    /// Swallow it (quiet mode).
    Silent,
}

impl FailurePolicy {
    fn report(&self, worker: usize, err: &anyhow::Error) {
        match self {
            FailurePolicy::LogFull => error!("worker {} failed to handle post: {:#}", worker, err),
            FailurePolicy::Silent => {}
        }
    }
}

/// Fixed-size pool of worker tasks fed from a bounded queue. Submission
/// never blocks; draining closes the queue and waits for in-flight posts.
pub struct WorkerPool {
    tx: Option<mpsc::Sender<StreamPost>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        size: usize,
        queue_depth: usize,
        handler: Arc<dyn PostHandler>,
        policy: FailurePolicy,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..size)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let handler = Arc::clone(&handler);
                tokio::spawn(worker_loop(worker, rx, handler, policy))
            })
            .collect();

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Queues a post without blocking the caller. A saturated or closed
    /// queue drops the post.
    pub fn submit(&self, post: StreamPost) {
        let Some(tx) = &self.tx else {
            debug!("worker pool already drained, dropping post");
            return;
        };
        if let Err(err) = tx.try_send(post) {
            warn!("worker queue rejected post: {}", err);
        }
    }

    /// Closes the queue and waits for every queued and in-flight post to
    /// finish. Draining twice is a no-op.
    pub async fn drain(&mut self) {
        self.tx.take();
        for handle in self.workers.drain(..) {
            if let Err(err) = handle.await {
                error!("worker task join failed: {}", err);
            }
        }
    }
}

async fn worker_loop(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<StreamPost>>>,
    handler: Arc<dyn PostHandler>,
    policy: FailurePolicy,
) {
    loop {
        let post = { rx.lock().await.recv().await };
        let Some(post) = post else { break };

        match AssertUnwindSafe(handler.handle(post)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => policy.report(worker, &err),
            Err(_) => policy.report(worker, &anyhow::anyhow!("handler panicked")),
        }
    }
    debug!("worker {} stopped", worker);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn post(text: &str) -> StreamPost {
        StreamPost {
            author_id: "1".to_string(),
            text: text.to_string(),
            cashtags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    struct Counting {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl PostHandler for Counting {
        async fn handle(&self, _post: StreamPost) -> Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Exploding {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl PostHandler for Exploding {
        async fn handle(&self, post: StreamPost) -> Result<()> {
            if post.text == "panic" {
                panic!("boom");
            }
            if post.text == "error" {
                anyhow::bail!("bad post");
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn handles_every_submitted_post() {
        let handler = Arc::new(Counting {
            handled: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::new(3, 64, handler.clone(), FailurePolicy::LogFull);

        for i in 0..10 {
            pool.submit(post(&format!("post {}", i)));
        }
        pool.drain().await;

        assert_eq!(handler.handled.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn failures_and_panics_do_not_stop_the_pool() {
        let handler = Arc::new(Exploding {
            handled: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::new(1, 64, handler.clone(), FailurePolicy::Silent);

        pool.submit(post("error"));
        pool.submit(post("panic"));
        pool.submit(post("fine"));
        pool.drain().await;

        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_twice_and_submit_after_drain_are_noops() {
        let handler = Arc::new(Counting {
            handled: AtomicUsize::new(0),
        });
        let mut pool = WorkerPool::new(2, 8, handler.clone(), FailurePolicy::LogFull);

        pool.drain().await;
        pool.drain().await;
        pool.submit(post("late"));

        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    }
}
