//! Random-access view over a single object.
//!
//! S3 has no partial writes, so every successful write or truncation
//! re-uploads the whole object. A failed upload restores the bytes, length
//! and cursor the handle had before the call.

use std::io::SeekFrom;
use std::sync::Arc;

use super::{ObjectStore, StoreError};
use crate::context::Context;
use crate::errors::{ContentError, CoreError};

/// A seekable, writable handle on an object.
#[async_trait::async_trait]
pub trait Content: Send + Sync {
    /// Object key this handle is bound to.
    fn key(&self) -> &str;

    /// Whether the object exists (was fetched or has been written).
    fn exists(&self) -> bool;

    /// Current length in bytes; zero when the object does not exist.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy bytes from the cursor into `buf`. Returns `Ok(0)` at the end.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ContentError>;

    /// Write `data` at the cursor and upload the result.
    async fn write(&mut self, data: &[u8]) -> Result<usize, ContentError>;

    /// Move the cursor. Past-the-end targets clamp to the end and fail with
    /// [`ContentError::Eof`].
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, ContentError>;

    /// Truncate or zero-extend the object and upload the result.
    async fn set_len(&mut self, len: u64) -> Result<(), ContentError>;

    /// Replace the whole object with `data` in a single upload. The cursor
    /// ends up after the new content; on failure nothing changes.
    async fn replace(&mut self, data: &[u8]) -> Result<(), ContentError>;

    async fn close(&mut self) -> Result<(), ContentError>;

    /// Read everything from the cursor to the end.
    fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, ContentError> {
        let mut buf = [0u8; 8192];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf)?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }
}

/// Content shared between the editor that owns it and the events that
/// carry it.
pub type SharedContent = Arc<tokio::sync::Mutex<dyn Content>>;

#[derive(Debug)]
enum ObjectState {
    NotExists,
    Exists { content: Vec<u8>, cursor: usize },
}

/// [`Content`] backed by an [`ObjectStore`] object.
pub struct ObjectContent {
    ctx: Context,
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    state: ObjectState,
}

impl std::fmt::Debug for ObjectContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectContent")
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("state", &self.state)
            .finish()
    }
}

impl ObjectContent {
    /// Fetch the object. A missing key yields a handle in the not-exists
    /// state; any other failure is returned. The cursor starts at the end.
    pub async fn open(
        ctx: Context,
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        key: &str,
    ) -> Result<Self, CoreError> {
        let fetched = ctx
            .run(async {
                match store.get_object(bucket, key).await {
                    Ok(body) => Ok(Some(body)),
                    Err(StoreError::NoSuchKey { .. }) => Ok(None),
                    Err(err) => Err(CoreError::from(err)),
                }
            })
            .await?;

        let state = match fetched {
            Some(content) => {
                tracing::debug!("opened {}/{} ({} bytes)", bucket, key, content.len());
                let cursor = content.len();
                ObjectState::Exists { content, cursor }
            }
            None => {
                tracing::debug!("opened {}/{} (not yet created)", bucket, key);
                ObjectState::NotExists
            }
        };

        Ok(Self {
            ctx,
            store,
            bucket: bucket.to_string(),
            key: key.to_string(),
            state,
        })
    }

    pub fn into_shared(self) -> SharedContent {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    async fn upload(
        ctx: &Context,
        store: &Arc<dyn ObjectStore>,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> Result<(), ContentError> {
        ctx.run(async {
            store
                .put_object(bucket, key, body)
                .await
                .map_err(CoreError::from)
        })
        .await
        .map_err(|cause| {
            tracing::warn!("upload of {}/{} failed: {}", bucket, key, cause);
            ContentError::Upload {
                key: key.to_string(),
                cause: Box::new(cause),
            }
        })
    }
}

#[async_trait::async_trait]
impl Content for ObjectContent {
    fn key(&self) -> &str {
        &self.key
    }

    fn exists(&self) -> bool {
        matches!(self.state, ObjectState::Exists { .. })
    }

    fn len(&self) -> u64 {
        match &self.state {
            ObjectState::NotExists => 0,
            ObjectState::Exists { content, .. } => content.len() as u64,
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ContentError> {
        match &mut self.state {
            ObjectState::NotExists => Err(ContentError::NotExists(self.key.clone())),
            ObjectState::Exists { content, cursor } => {
                let available = content.len().saturating_sub(*cursor);
                let n = available.min(buf.len());
                buf[..n].copy_from_slice(&content[*cursor..*cursor + n]);
                *cursor += n;
                Ok(n)
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, ContentError> {
        let Self {
            ctx,
            store,
            bucket,
            key,
            state,
        } = self;

        match state {
            ObjectState::NotExists => {
                Self::upload(&ctx.renew(), store, bucket, key, data.to_vec()).await?;
                *state = ObjectState::Exists {
                    content: data.to_vec(),
                    cursor: data.len(),
                };
                Ok(data.len())
            }
            ObjectState::Exists { content, cursor } => {
                let start = *cursor;
                let end = start + data.len();
                let old_len = content.len();
                let overwritten = content[start..end.min(old_len)].to_vec();

                if end > old_len {
                    content.resize(end, 0);
                }
                content[start..end].copy_from_slice(data);
                *cursor = end;

                match Self::upload(&ctx.renew(), store, bucket, key, content.clone()).await {
                    Ok(()) => Ok(data.len()),
                    Err(err) => {
                        content[start..start + overwritten.len()].copy_from_slice(&overwritten);
                        content.truncate(old_len);
                        *cursor = start;
                        Err(err)
                    }
                }
            }
        }
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, ContentError> {
        match &mut self.state {
            ObjectState::NotExists => Err(ContentError::NotExists(self.key.clone())),
            ObjectState::Exists { content, cursor } => {
                let len = content.len() as i128;
                let target: i128 = match pos {
                    SeekFrom::Start(offset) => offset as i128,
                    SeekFrom::Current(delta) => *cursor as i128 + delta as i128,
                    SeekFrom::End(delta) => len + delta as i128,
                };
                if target < 0 {
                    return Err(ContentError::NegativeOffset(
                        target.clamp(i64::MIN as i128, 0) as i64,
                    ));
                }
                if target > len {
                    *cursor = content.len();
                    return Err(ContentError::Eof);
                }
                *cursor = target as usize;
                Ok(target as u64)
            }
        }
    }

    async fn set_len(&mut self, len: u64) -> Result<(), ContentError> {
        let Self {
            ctx,
            store,
            bucket,
            key,
            state,
        } = self;

        match state {
            ObjectState::NotExists if len == 0 => Ok(()),
            ObjectState::NotExists => Err(ContentError::NotExists(key.clone())),
            ObjectState::Exists { content, cursor } => {
                let new_len = len as usize;
                let old_len = content.len();
                if new_len == old_len {
                    return Ok(());
                }
                let old_cursor = *cursor;
                let removed = content.get(new_len..).map(<[u8]>::to_vec);
                content.resize(new_len, 0);
                *cursor = old_cursor.min(new_len);

                match Self::upload(&ctx.renew(), store, bucket, key, content.clone()).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        content.truncate(old_len.min(new_len));
                        if let Some(tail) = removed {
                            content.extend_from_slice(&tail);
                        }
                        *cursor = old_cursor;
                        Err(err)
                    }
                }
            }
        }
    }

    async fn replace(&mut self, data: &[u8]) -> Result<(), ContentError> {
        Self::upload(&self.ctx.renew(), &self.store, &self.bucket, &self.key, data.to_vec())
            .await?;
        self.state = ObjectState::Exists {
            content: data.to_vec(),
            cursor: data.len(),
        };
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContentError> {
        tracing::debug!("closed {}/{}", self.bucket, self.key);
        Ok(())
    }
}
