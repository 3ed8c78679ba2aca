//! In-process [`ObjectStore`] with S3 listing semantics.
//!
//! Used by the test-suite and as an offline backend. Besides the store
//! operations it records every listing request and supports injected put
//! failures and delays, so callers can observe how the core drives the
//! API.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{ClientFactory, ListPage, ListRequest, ObjectStore, ObjectSummary, StoreError};
use crate::deck::Connection;
use crate::errors::CoreError;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

enum Entry<'a> {
    Prefix(String),
    Object(&'a str, &'a StoredObject),
}

impl Entry<'_> {
    fn sort_key(&self) -> &str {
        match self {
            Entry::Prefix(p) => p,
            Entry::Object(k, _) => k,
        }
    }
}

/// Thread-safe in-memory buckets.
#[derive(Default)]
pub struct InMemoryObjectStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, StoredObject>>>,
    list_requests: Mutex<Vec<ListRequest>>,
    put_failures: Mutex<VecDeque<StoreError>>,
    put_delay: Mutex<Option<Duration>>,
    list_delay: Mutex<Option<Duration>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.lock_buckets().entry(bucket.to_string()).or_default();
    }

    /// Seed an object directly, creating the bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock_buckets()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredObject {
                    data: data.into(),
                    last_modified: Utc::now(),
                },
            );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock_buckets()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|o| o.data.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock_buckets()
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every listing request received so far, in order.
    pub fn list_requests(&self) -> Vec<ListRequest> {
        self.list_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make the next `put_object` fail with `err`.
    pub fn fail_next_put(&self, err: StoreError) {
        self.put_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    /// Delay every `put_object` by `delay` before it takes effect.
    pub fn set_put_delay(&self, delay: Option<Duration>) {
        *self.put_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Delay every listing by `delay`. The request is recorded first.
    pub fn set_list_delay(&self, delay: Option<Duration>) {
        *self.list_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, StoredObject>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_objects_v2(&self, request: ListRequest) -> Result<ListPage, StoreError> {
        self.list_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let delay = *self.list_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let buckets = self.lock_buckets();
        let objects = buckets
            .get(&request.bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(request.bucket.clone()))?;

        // Entries in key order, with everything below a delimiter folded into
        // one common prefix.
        let mut entries: Vec<Entry<'_>> = Vec::new();
        for (key, object) in objects.range(request.prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&request.prefix) else {
                break;
            };
            let folded = if request.delimiter.is_empty() {
                None
            } else {
                rest.find(&request.delimiter).map(|idx| {
                    format!(
                        "{}{}",
                        request.prefix,
                        &rest[..idx + request.delimiter.len()]
                    )
                })
            };
            match folded {
                Some(prefix) => {
                    let seen = matches!(entries.last(), Some(Entry::Prefix(p)) if *p == prefix);
                    if !seen {
                        entries.push(Entry::Prefix(prefix));
                    }
                }
                None => entries.push(Entry::Object(key, object)),
            }
        }

        let max_keys = request.max_keys.clamp(1, super::MAX_KEYS_PER_PAGE) as usize;
        let mut remaining = entries.into_iter().filter(|e| match &request.continuation_token {
            Some(token) => e.sort_key() > token.as_str(),
            None => true,
        });

        let mut page = ListPage::default();
        let mut last_key = None;
        for entry in remaining.by_ref().take(max_keys) {
            last_key = Some(entry.sort_key().to_string());
            match entry {
                Entry::Prefix(prefix) => page.common_prefixes.push(prefix),
                Entry::Object(key, object) => page.contents.push(ObjectSummary {
                    key: key.to_string(),
                    size: object.data.len() as i64,
                    last_modified: Some(object.last_modified),
                }),
            }
        }
        if remaining.next().is_some() {
            page.next_continuation_token = last_key;
        }
        Ok(page)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let buckets = self.lock_buckets();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let delay = *self.put_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let injected = self
            .put_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(err) = injected {
            return Err(err);
        }
        let mut buckets = self.lock_buckets();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data: body,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut buckets = self.lock_buckets();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }
}

/// Hands out the same in-memory store for every connection and counts how
/// many clients were requested.
pub struct InMemoryClientFactory {
    store: Arc<InMemoryObjectStore>,
    created: AtomicUsize,
}

impl InMemoryClientFactory {
    pub fn new(store: Arc<InMemoryObjectStore>) -> Self {
        Self {
            store,
            created: AtomicUsize::new(0),
        }
    }

    pub fn clients_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for InMemoryClientFactory {
    fn client(&self, connection: &Connection) -> Result<Arc<dyn ObjectStore>, CoreError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("in-memory client for connection {}", connection.id());
        Ok(self.store.clone())
    }
}
