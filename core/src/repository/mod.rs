//! Adapters between the domain and its storage: the deck and settings in
//! the preferences store, directories and objects in S3.
//!
//! The deck and directory repositories also subscribe to the bus, perform
//! the requested I/O and publish the `.success` / `.failure` outcome.

pub mod deck;
pub mod directory;
pub mod settings;

pub use deck::{DeckRepository, ALL_CONNECTIONS_KEY};
pub use directory::DirectoryRepository;
pub use settings::{SettingsRepository, SETTINGS_KEY};

use crate::deck::{Connection, ConnectionId};
use crate::errors::CoreError;

/// Looks up the current state of a connection by id.
pub trait ConnectionSource: Send + Sync {
    fn connection(&self, id: ConnectionId) -> Result<Connection, CoreError>;
}
