use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::binding::Binding;
use crate::notification::NotificationRepository;

pub const DEFAULT_CAPACITY: usize = 100;

const CHANNEL_SIZE: usize = 64;

/// Most recent notifications first, formatted `"<Level>: <message>"`.
pub struct NotificationViewModel {
    messages: Binding<Vec<String>>,
    capacity: usize,
}

impl NotificationViewModel {
    /// Subscribe to `repo` until `done` is cancelled.
    pub fn new(
        repo: &NotificationRepository,
        capacity: usize,
        done: CancellationToken,
    ) -> Arc<Self> {
        let capacity = capacity.max(1);
        let vm = Arc::new(Self {
            messages: Binding::new(Vec::new()),
            capacity,
        });

        let (tx, mut rx) = mpsc::channel(CHANNEL_SIZE);
        repo.subscribe(tx);

        let this = vm.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = done.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(notification) => this.push(notification.to_string()),
                        None => break,
                    },
                }
            }
        });
        vm
    }

    fn push(&self, message: String) {
        self.messages.update(|messages| {
            messages.insert(0, message);
            messages.truncate(self.capacity);
        });
    }

    pub fn messages(&self) -> &Binding<Vec<String>> {
        &self.messages
    }
}
