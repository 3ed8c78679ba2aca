use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::{Event, Matcher};

/// Async callback invoked for matching events.
pub type Callback = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// One bus subscription: a receive channel plus a dispatch table of
/// matchers. Register callbacks with [`on`](Self::on), then start one of
/// the listen loops, which consume the subscriber.
pub struct Subscriber {
    id: u64,
    rx: mpsc::Receiver<Event>,
    handlers: Vec<(Matcher, Callback)>,
}

impl Subscriber {
    pub(super) fn new(id: u64, rx: mpsc::Receiver<Event>) -> Self {
        Self {
            id,
            rx,
            handlers: Vec::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Register `callback` for events accepted by `matcher`. A matcher that
    /// is already registered is ignored and `false` is returned.
    pub fn on<F, Fut>(&mut self, matcher: Matcher, callback: F) -> bool
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.handlers.iter().any(|(m, _)| *m == matcher) {
            tracing::warn!(
                "subscriber {} already handles {:?}, ignoring",
                self.id,
                matcher
            );
            return false;
        }
        let callback: Callback = Arc::new(move |event| callback(event).boxed());
        self.handlers.push((matcher, callback));
        true
    }

    /// Next raw event, `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Next raw event if one is already queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Dispatch with `workers` cooperating tasks. Each task handles one
    /// event at a time and awaits its callbacks in registration order, so a
    /// single worker processes events strictly in arrival order.
    pub fn listen_with_workers(self, workers: usize) -> Vec<JoinHandle<()>> {
        let id = self.id;
        let handlers = Arc::new(self.handlers);
        let rx = Arc::new(Mutex::new(self.rx));

        (0..workers.max(1))
            .map(|worker| {
                let handlers = handlers.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(event) = next else {
                            tracing::debug!("subscriber {} worker {} stopped", id, worker);
                            break;
                        };
                        dispatch(&handlers, event).await;
                    }
                })
            })
            .collect()
    }

    /// Dispatch every match on its own task.
    pub fn listen_non_blocking(mut self) -> JoinHandle<()> {
        let id = self.id;
        let handlers = std::mem::take(&mut self.handlers);
        tokio::spawn(async move {
            while let Some(event) = self.rx.recv().await {
                let type_name = event.type_name();
                for (matcher, callback) in &handlers {
                    if matcher.matches_type(&type_name) {
                        tokio::spawn(callback(event.clone()));
                    }
                }
            }
            tracing::debug!("subscriber {} stopped", id);
        })
    }
}

async fn dispatch(handlers: &[(Matcher, Callback)], event: Event) {
    let type_name = event.type_name();
    for (matcher, callback) in handlers {
        if matcher.matches_type(&type_name) {
            callback(event.clone()).await;
        }
    }
}
