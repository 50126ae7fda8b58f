use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::remote::{RATE_LIMIT_CODE, StreamMessage, parse_stream_message};
use crate::services::worker_pool::WorkerPool;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("stream authorization rejected; check the credentials")]
    Auth,
    #[error("websocket error: {0}")]
    Ws(#[from] tungstenite::Error),
}

/// Owns the single firehose connection. Inbound frames are validated,
/// filtered by the author allow-list and fanned out to the worker pool; the
/// receive loop itself never does any heavy work.
pub struct StreamDispatcher {
    url: String,
    allow_list: Vec<String>,
    pool: WorkerPool,
    connected: AtomicBool,
    shutdown: Notify,
}

impl StreamDispatcher {
    pub fn new(base_url: &str, allow_list: Vec<String>, pool: WorkerPool) -> Self {
        Self {
            url: subscription_url(base_url, &allow_list),
            allow_list,
            pool,
            connected: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Connects and processes frames until the provider, an error or
    /// `close` ends the stream. Calling this while already connected is a
    /// no-op.
    pub async fn run(&self) -> Result<(), StreamError> {
        if self.connected.swap(true, Ordering::SeqCst) {
            debug!("stream already open");
            return Ok(());
        }

        info!("connecting to {}", self.url);
        let ws_stream = match tokio_tungstenite::connect_async(&self.url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(tungstenite::Error::Http(resp))
                if resp.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
            {
                self.connected.store(false, Ordering::SeqCst);
                return Err(StreamError::Auth);
            }
            Err(err) => {
                self.connected.store(false, Ordering::SeqCst);
                return Err(StreamError::Ws(err));
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(ref text))) => {
                        if self.dispatch(text).is_break() {
                            info!("provider requested disconnect, closing stream");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!("close frame received: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        error!("websocket error: {}", err);
                        self.connected.store(false, Ordering::SeqCst);
                        return Err(StreamError::Ws(err));
                    }
                    None => {
                        debug!("stream ended");
                        break;
                    }
                },
                _ = self.shutdown.notified() => {
                    debug!("shutdown requested");
                    break;
                }
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Routes one text frame. `Break` means the provider told us to go
    /// away (rate-limit code) and the stream should self-close.
    fn dispatch(&self, raw: &str) -> ControlFlow<()> {
        let message = match parse_stream_message(raw) {
            Ok(message) => message,
            Err(err) => {
                debug!("undecodable frame: {}", err);
                return ControlFlow::Continue(());
            }
        };

        match message {
            StreamMessage::Disconnect(info) if info.code == RATE_LIMIT_CODE => {
                warn!("rate-limit disconnect (code {})", info.code);
                ControlFlow::Break(())
            }
            StreamMessage::Disconnect(info) => {
                warn!("disconnect notice (code {}): {:?}", info.code, info.reason);
                ControlFlow::Continue(())
            }
            StreamMessage::Post(event) => {
                let Some(post) = event.to_stream_post() else {
                    debug!("dropping malformed post");
                    return ControlFlow::Continue(());
                };
                if !self.allow_list.is_empty() && !self.allow_list.contains(&post.author_id) {
                    debug!("dropping post from unsubscribed author {}", post.author_id);
                    return ControlFlow::Continue(());
                }
                self.pool.submit(post);
                ControlFlow::Continue(())
            }
        }
    }

    /// Stops the receive loop and drains the worker pool. Closing twice is
    /// a no-op.
    pub async fn close(&mut self) {
        self.shutdown.notify_one();
        self.pool.drain().await;
        self.connected.store(false, Ordering::SeqCst);
        info!("stream closed");
    }
}

fn subscription_url(base: &str, allow_list: &[String]) -> String {
    format!("{}{}", base, allow_list.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::worker_pool::{FailurePolicy, PostHandler};
    use async_trait::async_trait;
    use common::models::StreamPost;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        posts: Arc<Mutex<Vec<StreamPost>>>,
    }

    #[async_trait]
    impl PostHandler for Recorder {
        async fn handle(&self, post: StreamPost) -> anyhow::Result<()> {
            self.posts.lock().unwrap().push(post);
            Ok(())
        }
    }

    fn dispatcher(allow_list: Vec<String>) -> (StreamDispatcher, Arc<Mutex<Vec<StreamPost>>>) {
        let posts = Arc::new(Mutex::new(Vec::new()));
        let handler = Arc::new(Recorder {
            posts: Arc::clone(&posts),
        });
        let pool = WorkerPool::new(2, 16, handler, FailurePolicy::LogFull);
        let dispatcher = StreamDispatcher::new("wss://example.invalid/stream?follow=", allow_list, pool);
        (dispatcher, posts)
    }

    fn post_frame(author: &str, text: &str) -> String {
        format!(r#"{{"text": "{}", "user": {{"id_str": "{}"}}}}"#, text, author)
    }

    #[tokio::test]
    async fn valid_posts_reach_the_workers() {
        let (mut dispatcher, posts) = dispatcher(Vec::new());

        assert!(dispatcher.dispatch(&post_frame("7", "hello market")).is_continue());
        dispatcher.close().await;

        let posts = posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, "hello market");
    }

    #[tokio::test]
    async fn allow_list_filters_authors() {
        let (mut dispatcher, posts) = dispatcher(vec!["42".to_string()]);

        dispatcher.dispatch(&post_frame("7", "ignored"));
        dispatcher.dispatch(&post_frame("42", "kept"));
        dispatcher.close().await;

        let posts = posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author_id, "42");
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_silently() {
        let (mut dispatcher, posts) = dispatcher(Vec::new());

        assert!(dispatcher.dispatch("not json at all").is_continue());
        assert!(dispatcher.dispatch(r#"{"user": {"id_str": "7"}}"#).is_continue());
        dispatcher.close().await;

        assert!(posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_disconnect_breaks_the_loop() {
        let (mut dispatcher, _posts) = dispatcher(Vec::new());

        let frame = r#"{"disconnect": {"code": 420, "reason": "too fast"}}"#;
        assert!(dispatcher.dispatch(frame).is_break());

        let other = r#"{"disconnect": {"code": 7, "reason": "maintenance"}}"#;
        assert!(dispatcher.dispatch(other).is_continue());
        dispatcher.close().await;
    }

    #[tokio::test]
    async fn close_twice_is_a_noop() {
        let (mut dispatcher, _posts) = dispatcher(Vec::new());
        dispatcher.close().await;
        dispatcher.close().await;
    }

    #[test]
    fn subscription_url_appends_follow_ids() {
        let url = subscription_url(
            "wss://example.invalid/stream?follow=",
            &["1".to_string(), "2".to_string()],
        );
        assert_eq!(url, "wss://example.invalid/stream?follow=1,2");
    }
}
