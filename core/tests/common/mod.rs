//! Shared test utilities for bucketdeck core integration tests.
//!
//! Builds a fully wired [`App`] over an in-memory object store and
//! preference store, plus a polling helper for asynchronous outcomes.

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module. Suppress dead_code warnings.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bucketdeck_core::app::App;
use bucketdeck_core::bus::BusConfig;
use bucketdeck_core::preferences::MemoryPreferences;
use bucketdeck_core::s3::{InMemoryClientFactory, InMemoryObjectStore};
use bucketdeck_core::settings::ColorTheme;
use bucketdeck_core::viewmodel::ThemeHost;
use tokio_util::sync::CancellationToken;

pub const BUCKET: &str = "b1";

/// Theme host that ignores theme changes.
pub struct NoTheme;

impl ThemeHost for NoTheme {
    fn apply_theme(&self, _theme: ColorTheme) {}
}

pub struct Harness {
    pub done: CancellationToken,
    pub prefs: Arc<MemoryPreferences>,
    pub store: Arc<InMemoryObjectStore>,
    pub factory: Arc<InMemoryClientFactory>,
    pub app: App,
}

/// A harness with an empty bucket [`BUCKET`] and empty preferences.
pub async fn harness() -> Harness {
    harness_with(Arc::new(MemoryPreferences::new())).await
}

pub async fn harness_with(prefs: Arc<MemoryPreferences>) -> Harness {
    let store = Arc::new(InMemoryObjectStore::new());
    store.create_bucket(BUCKET);
    let factory = Arc::new(InMemoryClientFactory::new(store.clone()));
    let done = CancellationToken::new();
    let app = App::build(
        done.clone(),
        prefs.clone(),
        factory.clone(),
        Arc::new(NoTheme),
        BusConfig::default(),
    )
    .await;
    Harness {
        done,
        prefs,
        store,
        factory,
        app,
    }
}

/// Poll `check` until it holds. Panics after two seconds.
pub async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}
