use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CoreError;

/// Region used when a connection is created without a provider option.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Opaque connection identifier.
///
/// [`ConnectionId::nil()`] is the "no connection" marker and never
/// collides with a generated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::Invalid(format!("connection id {s:?}: {e}")))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Backend flavor of a connection, with its provider-specific fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// Amazon S3. TLS is always on.
    Aws { region: String },
    /// Any S3-compatible endpoint (MinIO, Ceph, Garage, ...).
    S3Like { server: String, use_tls: bool },
}

impl Provider {
    /// Persisted `type` string.
    pub fn type_str(&self) -> &'static str {
        match self {
            Provider::Aws { .. } => "aws",
            Provider::S3Like { .. } => "s3-like",
        }
    }

    fn same_kind(&self, other: &Provider) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl Default for Provider {
    fn default() -> Self {
        Provider::Aws {
            region: DEFAULT_AWS_REGION.to_string(),
        }
    }
}

/// Options accepted by [`Connection::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOption {
    /// Use a known id instead of generating one.
    Id(ConnectionId),
    Aws { region: String },
    S3Like { server: String, use_tls: bool },
    ReadOnly(bool),
}

/// Field updates accepted by [`Deck::update`](super::Deck::update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Name(String),
    AccessKey(String),
    SecretKey(String),
    Bucket(String),
    Region(String),
    Server(String),
    UseTls(bool),
    Provider(Provider),
    ReadOnly(bool),
}

/// A credentialed backend descriptor.
///
/// Mutators return whether the value changed. They never touch a
/// read-only connection (except [`set_read_only`](Self::set_read_only),
/// which is how the flag is cleared) and bump the revision by one only
/// when something actually changed.
#[derive(Clone, PartialEq, Eq)]
pub struct Connection {
    id: ConnectionId,
    name: String,
    access_key: String,
    secret_key: String,
    bucket: String,
    provider: Provider,
    read_only: bool,
    revision: u64,
}

impl Connection {
    pub fn new(
        name: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        bucket: impl Into<String>,
        options: impl IntoIterator<Item = ConnectionOption>,
    ) -> Self {
        let mut conn = Self {
            id: ConnectionId::new(),
            name: name.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            bucket: bucket.into(),
            provider: Provider::default(),
            read_only: false,
            revision: 0,
        };
        for option in options {
            match option {
                ConnectionOption::Id(id) => conn.id = id,
                ConnectionOption::Aws { region } => conn.provider = Provider::Aws { region },
                ConnectionOption::S3Like { server, use_tls } => {
                    conn.provider = Provider::S3Like { server, use_tls }
                }
                ConnectionOption::ReadOnly(read_only) => conn.read_only = read_only,
            }
        }
        conn
    }

    /// Rebuild a connection from persisted fields, keeping its revision.
    pub(crate) fn restore(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// AWS region, or `""` for S3-like connections.
    pub fn region(&self) -> &str {
        match &self.provider {
            Provider::Aws { region } => region,
            Provider::S3Like { .. } => "",
        }
    }

    /// Custom endpoint, or `""` for AWS connections.
    pub fn server(&self) -> &str {
        match &self.provider {
            Provider::Aws { .. } => "",
            Provider::S3Like { server, .. } => server,
        }
    }

    pub fn use_tls(&self) -> bool {
        match &self.provider {
            Provider::Aws { .. } => true,
            Provider::S3Like { use_tls, .. } => *use_tls,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Check the provider invariants and required fields.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Invalid("connection name is empty".to_string()));
        }
        if self.bucket.trim().is_empty() {
            return Err(CoreError::Invalid(format!(
                "connection {}: bucket is empty",
                self.name
            )));
        }
        match &self.provider {
            Provider::Aws { region } if region.is_empty() => Err(CoreError::Invalid(format!(
                "connection {}: AWS connections need a region",
                self.name
            ))),
            Provider::S3Like { server, .. } if server.is_empty() => Err(CoreError::Invalid(
                format!("connection {}: S3-like connections need a server", self.name),
            )),
            _ => Ok(()),
        }
    }

    pub fn set_name(&mut self, name: &str) -> bool {
        let changed = Self::assign(self.read_only, &mut self.name, name);
        self.bump_if(changed)
    }

    pub fn set_access_key(&mut self, access_key: &str) -> bool {
        let changed = Self::assign(self.read_only, &mut self.access_key, access_key);
        self.bump_if(changed)
    }

    pub fn set_secret_key(&mut self, secret_key: &str) -> bool {
        let changed = Self::assign(self.read_only, &mut self.secret_key, secret_key);
        self.bump_if(changed)
    }

    pub fn set_bucket(&mut self, bucket: &str) -> bool {
        let changed = Self::assign(self.read_only, &mut self.bucket, bucket);
        self.bump_if(changed)
    }

    /// Only meaningful for AWS connections; a no-op otherwise.
    pub fn set_region(&mut self, value: &str) -> bool {
        let read_only = self.read_only;
        let changed = match &mut self.provider {
            Provider::Aws { region } => Self::assign(read_only, region, value),
            Provider::S3Like { .. } => false,
        };
        self.bump_if(changed)
    }

    /// Only meaningful for S3-like connections; a no-op otherwise.
    pub fn set_server(&mut self, value: &str) -> bool {
        let read_only = self.read_only;
        let changed = match &mut self.provider {
            Provider::S3Like { server, .. } => Self::assign(read_only, server, value),
            Provider::Aws { .. } => false,
        };
        self.bump_if(changed)
    }

    /// Only meaningful for S3-like connections; a no-op otherwise.
    pub fn set_use_tls(&mut self, value: bool) -> bool {
        let read_only = self.read_only;
        let changed = match &mut self.provider {
            Provider::S3Like { use_tls, .. } if !read_only && *use_tls != value => {
                *use_tls = value;
                true
            }
            _ => false,
        };
        self.bump_if(changed)
    }

    /// Switch provider (or replace the provider fields).
    ///
    /// Switching to the other kind resets every provider-specific field to
    /// the values carried by `provider`.
    pub fn set_provider(&mut self, provider: Provider) -> bool {
        if self.read_only || self.provider == provider {
            return false;
        }
        if !self.provider.same_kind(&provider) {
            tracing::debug!(
                "connection {} switches provider {} -> {}",
                self.id,
                self.provider.type_str(),
                provider.type_str()
            );
        }
        self.provider = provider;
        self.bump_if(true)
    }

    pub fn set_read_only(&mut self, read_only: bool) -> bool {
        let changed = self.read_only != read_only;
        self.read_only = read_only;
        self.bump_if(changed)
    }

    /// Apply a single update, returning whether it changed anything.
    pub fn apply(&mut self, update: &ConnectionUpdate) -> bool {
        match update {
            ConnectionUpdate::Name(v) => self.set_name(v),
            ConnectionUpdate::AccessKey(v) => self.set_access_key(v),
            ConnectionUpdate::SecretKey(v) => self.set_secret_key(v),
            ConnectionUpdate::Bucket(v) => self.set_bucket(v),
            ConnectionUpdate::Region(v) => self.set_region(v),
            ConnectionUpdate::Server(v) => self.set_server(v),
            ConnectionUpdate::UseTls(v) => self.set_use_tls(*v),
            ConnectionUpdate::Provider(p) => self.set_provider(p.clone()),
            ConnectionUpdate::ReadOnly(v) => self.set_read_only(*v),
        }
    }

    fn assign(read_only: bool, field: &mut String, value: &str) -> bool {
        if read_only || field == value {
            return false;
        }
        *field = value.to_string();
        true
    }

    fn bump_if(&mut self, changed: bool) -> bool {
        if changed {
            self.revision += 1;
        }
        changed
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("provider", &self.provider)
            .field("read_only", &self.read_only)
            .field("revision", &self.revision)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aws() -> Connection {
        Connection::new("conn1", "ak", "sk", "b1", [])
    }

    fn s3_like() -> Connection {
        Connection::new(
            "minio",
            "ak",
            "sk",
            "b1",
            [ConnectionOption::S3Like {
                server: "localhost:9000".into(),
                use_tls: false,
            }],
        )
    }

    #[test]
    fn new_defaults_to_aws_us_east_1() {
        let conn = aws();
        assert_eq!(conn.provider(), &Provider::default());
        assert_eq!(conn.region(), "us-east-1");
        assert_eq!(conn.server(), "");
        assert!(conn.use_tls());
        assert!(!conn.is_read_only());
        assert_eq!(conn.revision(), 0);
        assert!(!conn.id().is_nil());
    }

    #[test]
    fn new_applies_options() {
        let id = ConnectionId::new();
        let conn = Connection::new(
            "c",
            "ak",
            "sk",
            "b",
            [
                ConnectionOption::Id(id),
                ConnectionOption::Aws {
                    region: "eu-west-1".into(),
                },
                ConnectionOption::ReadOnly(true),
            ],
        );
        assert_eq!(conn.id(), id);
        assert_eq!(conn.region(), "eu-west-1");
        assert!(conn.is_read_only());
    }

    #[test]
    fn generated_ids_are_unique_and_not_nil() {
        assert_ne!(aws().id(), aws().id());
        assert!(ConnectionId::nil().is_nil());
        assert_eq!(ConnectionId::default(), ConnectionId::nil());
    }

    #[test]
    fn effective_update_bumps_revision_once() {
        let mut conn = aws();
        assert!(conn.set_name("renamed"));
        assert_eq!(conn.revision(), 1);
        assert_eq!(conn.name(), "renamed");
    }

    #[test]
    fn no_op_update_keeps_revision() {
        let mut conn = aws();
        assert!(!conn.set_name("conn1"));
        assert!(!conn.set_bucket("b1"));
        assert!(!conn.set_region("us-east-1"));
        assert_eq!(conn.revision(), 0);
    }

    #[test]
    fn read_only_connection_ignores_mutations() {
        let mut conn = Connection::new("c", "ak", "sk", "b", [ConnectionOption::ReadOnly(true)]);
        let before = conn.clone();
        assert!(!conn.set_name("x"));
        assert!(!conn.set_access_key("x"));
        assert!(!conn.set_secret_key("x"));
        assert!(!conn.set_bucket("x"));
        assert!(!conn.set_region("x"));
        assert!(!conn.set_provider(Provider::S3Like {
            server: "s".into(),
            use_tls: true
        }));
        assert_eq!(conn, before);
    }

    #[test]
    fn read_only_flag_can_be_cleared() {
        let mut conn = Connection::new("c", "ak", "sk", "b", [ConnectionOption::ReadOnly(true)]);
        assert!(conn.set_read_only(false));
        assert_eq!(conn.revision(), 1);
        assert!(conn.set_name("now-writable"));
        assert_eq!(conn.revision(), 2);
    }

    #[test]
    fn provider_specific_setters_ignore_other_provider() {
        let mut conn = aws();
        assert!(!conn.set_server("x"));
        assert!(!conn.set_use_tls(false));
        assert_eq!(conn.revision(), 0);

        let mut conn = s3_like();
        assert!(!conn.set_region("eu-west-1"));
        assert!(conn.set_use_tls(true));
        assert!(conn.set_server("minio:9000"));
        assert_eq!(conn.revision(), 2);
    }

    #[test]
    fn switching_provider_resets_fields() {
        let mut conn = s3_like();
        assert!(conn.set_provider(Provider::Aws {
            region: "ap-south-1".into()
        }));
        assert_eq!(conn.server(), "");
        assert_eq!(conn.region(), "ap-south-1");
        assert!(conn.use_tls());
        assert_eq!(conn.revision(), 1);

        assert!(!conn.set_provider(Provider::Aws {
            region: "ap-south-1".into()
        }));
        assert_eq!(conn.revision(), 1);
    }

    #[test]
    fn validate_checks_provider_invariants() {
        assert!(aws().validate().is_ok());
        assert!(s3_like().validate().is_ok());

        let conn = Connection::new("c", "ak", "sk", "b", [ConnectionOption::Aws { region: "".into() }]);
        assert!(conn.validate().is_err());

        let conn = Connection::new(
            "c",
            "ak",
            "sk",
            "b",
            [ConnectionOption::S3Like {
                server: "".into(),
                use_tls: true,
            }],
        );
        assert!(conn.validate().is_err());

        let conn = Connection::new("c", "ak", "sk", "", []);
        assert!(conn.validate().is_err());
    }

    #[test]
    fn debug_redacts_secret_key() {
        let conn = Connection::new("c", "ak", "very-secret", "b", []);
        let out = format!("{conn:?}");
        assert!(!out.contains("very-secret"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn parse_connection_id() {
        let id = ConnectionId::new();
        assert_eq!(ConnectionId::parse(&id.to_string()).unwrap(), id);
        assert!(ConnectionId::parse("not-a-uuid").is_err());
    }
}
