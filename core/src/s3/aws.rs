//! [`ObjectStore`] over `aws-sdk-s3`.
//!
//! Works against AWS proper and against S3-compatible servers; the latter
//! get an explicit endpoint and path-style addressing.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use super::{ClientFactory, ListPage, ListRequest, ObjectStore, ObjectSummary, StoreError};
use crate::deck::{Connection, Provider, DEFAULT_AWS_REGION};
use crate::errors::CoreError;

const MULTIPART_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024;
const MULTIPART_PART_SIZE_BYTES: usize = 8 * 1024 * 1024;

/// Classify an SDK failure by its S3 error code.
fn map_sdk_error<E, R>(err: SdkError<E, R>, bucket: &str, key: &str) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err.code() {
        Some("NoSuchKey") | Some("NotFound") => StoreError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some("NoSuchBucket") => StoreError::NoSuchBucket(bucket.to_string()),
        Some("InvalidObjectState") => StoreError::InvalidObjectState {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StoreError::Other(DisplayErrorContext(&err).to_string()),
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    dt.to_millis()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Endpoint URL for an S3-compatible server given as `host[:port]` or as a
/// full URL.
fn endpoint_url(server: &str, use_tls: bool) -> String {
    let server = server.trim();
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_string()
    } else if use_tls {
        format!("https://{server}")
    } else {
        format!("http://{server}")
    }
}

/// Build an SDK client for `connection`.
pub fn build_client(connection: &Connection) -> Client {
    let credentials = Credentials::new(
        connection.access_key().to_string(),
        connection.secret_key().to_string(),
        None,
        None,
        "bucketdeck",
    );

    let region = match connection.provider() {
        Provider::Aws { region } if !region.trim().is_empty() => region.trim().to_string(),
        _ => DEFAULT_AWS_REGION.to_string(),
    };

    let mut config_builder = aws_sdk_s3::config::Builder::new()
        .behavior_version_latest()
        .region(Region::new(region))
        .credentials_provider(credentials);

    if let Provider::S3Like { server, use_tls } = connection.provider() {
        config_builder = config_builder
            .endpoint_url(endpoint_url(server, *use_tls))
            .force_path_style(true);
    }

    Client::from_conf(config_builder.build())
}

/// Aborts a multipart upload unless finished. Runs on drop, so an upload
/// abandoned mid-way by cancellation is cleaned up as well as a failed one.
struct PendingMultipart {
    client: Client,
    bucket: String,
    key: String,
    upload_id: Option<String>,
}

impl PendingMultipart {
    fn finish(mut self) {
        self.upload_id = None;
    }
}

impl Drop for PendingMultipart {
    fn drop(&mut self) {
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                "cannot abort multipart upload of {}/{} outside a runtime",
                self.bucket,
                self.key
            );
            return;
        };
        let client = self.client.clone();
        let bucket = std::mem::take(&mut self.bucket);
        let key = std::mem::take(&mut self.key);
        runtime.spawn(async move {
            match client
                .abort_multipart_upload()
                .bucket(&bucket)
                .key(&key)
                .upload_id(upload_id)
                .send()
                .await
            {
                Ok(_) => tracing::debug!("aborted multipart upload of {}/{}", bucket, key),
                Err(err) => tracing::warn!(
                    "failed to abort multipart upload of {}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&err)
                ),
            }
        });
    }
}

/// Sibling `.part` file a download streams into. Removed on drop unless
/// moved into place.
struct PartialDownload {
    path: PathBuf,
    kept: bool,
}

impl PartialDownload {
    fn next_to(target: &Path) -> Self {
        let mut name = target.file_name().map(OsString::from).unwrap_or_default();
        name.push(".part");
        Self {
            path: target.with_file_name(name),
            kept: false,
        }
    }

    async fn persist(mut self, target: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, target).await?;
        self.kept = true;
        Ok(())
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("removed partial download {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "failed to remove partial download {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Store backed by a live SDK client.
#[derive(Clone)]
pub struct AwsObjectStore {
    client: Client,
}

impl AwsObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        let multipart = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;
        let upload_id = multipart
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::Other("missing multipart upload id".to_string()))?;
        let pending = PendingMultipart {
            client: self.client.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: Some(upload_id.clone()),
        };

        let mut file = tokio::fs::File::open(local_path).await?;
        let mut parts: Vec<CompletedPart> = Vec::new();
        let mut part_number: i32 = 1;
        let mut transferred: u64 = 0;

        let result: Result<(), StoreError> = async {
            loop {
                let mut buffer = vec![0u8; MULTIPART_PART_SIZE_BYTES];
                let mut read_total = 0;
                while read_total < buffer.len() {
                    let read = file.read(&mut buffer[read_total..]).await?;
                    if read == 0 {
                        break;
                    }
                    read_total += read;
                }
                if read_total == 0 {
                    break;
                }
                buffer.truncate(read_total);

                let output = self
                    .client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id.clone())
                    .part_number(part_number)
                    .body(ByteStream::from(buffer))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error(e, bucket, key))?;

                parts.push(
                    CompletedPart::builder()
                        .set_e_tag(output.e_tag().map(str::to_string))
                        .part_number(part_number)
                        .build(),
                );
                transferred += read_total as u64;
                part_number += 1;
            }

            if parts.is_empty() {
                return Err(StoreError::Other(
                    "multipart upload produced no parts".to_string(),
                ));
            }

            self.client
                .complete_multipart_upload()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id.clone())
                .multipart_upload(
                    CompletedMultipartUpload::builder()
                        .set_parts(Some(std::mem::take(&mut parts)))
                        .build(),
                )
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket, key))?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                pending.finish();
                Ok(transferred)
            }
            Err(err) => {
                tracing::warn!("aborting multipart upload of {}/{}: {}", bucket, key, err);
                Err(err)
            }
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for AwsObjectStore {
    async fn list_objects_v2(&self, request: ListRequest) -> Result<ListPage, StoreError> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix)
            .delimiter(&request.delimiter)
            .max_keys(request.max_keys)
            .set_continuation_token(request.continuation_token.clone())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &request.bucket, &request.prefix))?;

        let common_prefixes = response
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();

        let contents = response
            .contents()
            .iter()
            .filter_map(|object| {
                Some(ObjectSummary {
                    key: object.key()?.to_string(),
                    size: object.size().unwrap_or(0),
                    last_modified: object.last_modified().and_then(to_chrono),
                })
            })
            .collect();

        let next_continuation_token = if response.is_truncated().unwrap_or(false) {
            response.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            common_prefixes,
            contents,
            next_continuation_token,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Other(format!("download stream failed: {e}")))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        let len = body.len() as i64;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(len)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;
        Ok(())
    }

    async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, bucket, key))?;

        let partial = PartialDownload::next_to(local_path);
        let file = tokio::fs::File::create(&partial.path).await?;
        let mut writer = BufWriter::new(file);
        let mut body = output.body;
        let mut transferred: u64 = 0;

        while let Some(bytes) = body
            .try_next()
            .await
            .map_err(|e| StoreError::Other(format!("download stream failed: {e}")))?
        {
            writer.write_all(&bytes).await?;
            transferred += bytes.len() as u64;
        }
        writer.flush().await?;
        drop(writer);
        partial.persist(local_path).await?;
        Ok(transferred)
    }

    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        let total = tokio::fs::metadata(local_path).await?.len();
        if total <= MULTIPART_THRESHOLD_BYTES {
            let body = ByteStream::from_path(local_path.to_path_buf())
                .await
                .map_err(|e| {
                    StoreError::Other(format!("failed to stream {}: {e}", local_path.display()))
                })?;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .send()
                .await
                .map_err(|e| map_sdk_error(e, bucket, key))?;
            return Ok(total);
        }
        self.multipart_upload(bucket, key, local_path).await
    }
}

/// Builds an [`AwsObjectStore`] per connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct AwsClientFactory;

impl ClientFactory for AwsClientFactory {
    fn client(&self, connection: &Connection) -> Result<Arc<dyn ObjectStore>, CoreError> {
        connection.validate()?;
        tracing::info!(
            "creating S3 client for connection {} ({})",
            connection.name(),
            connection.provider().type_str()
        );
        Ok(Arc::new(AwsObjectStore::new(build_client(connection))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_adds_scheme() {
        assert_eq!(endpoint_url("localhost:9000", false), "http://localhost:9000");
        assert_eq!(endpoint_url("minio.local", true), "https://minio.local");
        assert_eq!(
            endpoint_url("http://already:9000", true),
            "http://already:9000"
        );
    }

    #[tokio::test]
    async fn partial_download_is_removed_unless_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("report.csv");

        let abandoned = PartialDownload::next_to(&target);
        assert_eq!(abandoned.path, dir.path().join("report.csv.part"));
        std::fs::write(&abandoned.path, "half").unwrap();
        drop(abandoned);
        assert!(!dir.path().join("report.csv.part").exists());
        assert!(!target.exists());

        let finished = PartialDownload::next_to(&target);
        std::fs::write(&finished.path, "all").unwrap();
        finished.persist(&target).await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "all");
        assert!(!dir.path().join("report.csv.part").exists());
    }
}
