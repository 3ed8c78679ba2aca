//! User-facing notifications.
//!
//! [`NotificationRepository`] fans notifications out to subscribed
//! channels. Delivery never blocks: a subscriber whose channel is full
//! misses the message, a closed channel is dropped.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::errors::CoreError;

/// Severity, ordered `Debug < Info < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Debug => write!(f, "Debug"),
            Level::Info => write!(f, "Info"),
            Level::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Error(Arc<CoreError>),
    Message(String),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Error(err) => write!(f, "{err}"),
            Payload::Message(msg) => write!(f, "{msg}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: Level,
    pub time: DateTime<Utc>,
    pub payload: Payload,
}

impl Notification {
    pub fn new(level: Level, payload: Payload) -> Self {
        Self {
            level,
            time: Utc::now(),
            payload,
        }
    }

    pub fn error(err: impl Into<Arc<CoreError>>) -> Self {
        Self::new(Level::Error, Payload::Error(err.into()))
    }

    pub fn info(msg: impl Into<String>) -> Self {
        Self::new(Level::Info, Payload::Message(msg.into()))
    }

    pub fn debug(msg: impl Into<String>) -> Self {
        Self::new(Level::Debug, Payload::Message(msg.into()))
    }
}

/// `"<Level>: <message>"`.
impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.payload)
    }
}

pub struct NotificationRepository {
    subscribers: Mutex<Vec<mpsc::Sender<Notification>>>,
    level: Mutex<Level>,
}

impl Default for NotificationRepository {
    fn default() -> Self {
        Self::new(Level::Info)
    }
}

impl NotificationRepository {
    pub fn new(level: Level) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            level: Mutex::new(level),
        }
    }

    pub fn subscribe(&self, tx: mpsc::Sender<Notification>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
    }

    pub fn unsubscribe(&self, tx: &mpsc::Sender<Notification>) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s| !s.same_channel(tx));
    }

    pub fn level(&self) -> Level {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Suppress notifications strictly less severe than `level`.
    pub fn set_level(&self, level: Level) {
        *self.level.lock().unwrap_or_else(PoisonError::into_inner) = level;
    }

    pub fn notify(&self, notification: Notification) {
        if notification.level < self.level() {
            return;
        }
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(notification.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("notification subscriber is full, dropping message");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    pub fn notify_error(&self, err: impl Into<Arc<CoreError>>) {
        let notification = Notification::error(err);
        tracing::warn!("{}", notification);
        self.notify(notification);
    }

    pub fn notify_info(&self, msg: impl Into<String>) {
        self.notify(Notification::info(msg));
    }

    pub fn notify_debug(&self, msg: impl Into<String>) {
        self.notify(Notification::debug(msg));
    }
}
