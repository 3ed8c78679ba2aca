//! The connection deck: every known backend plus at most one selection.
//!
//! Mutators never publish anything themselves. Each returns a
//! [`DeckEvent`] that the caller publishes on the bus; the deck repository
//! persists the change and answers with the `.success` / `.failure`
//! outcome.

pub mod connection;

pub use connection::{
    Connection, ConnectionId, ConnectionOption, ConnectionUpdate, Provider, DEFAULT_AWS_REGION,
};

use std::sync::Arc;

use crate::errors::CoreError;

/// Domain event produced by a deck mutation.
///
/// Each variant carries the affected connection and a snapshot of the deck
/// taken right after the mutation, which is what the repository persists.
#[derive(Debug, Clone)]
pub enum DeckEvent {
    Create {
        connection: Connection,
        deck: Arc<Deck>,
    },
    Update {
        connection: Connection,
        deck: Arc<Deck>,
    },
    Remove {
        connection: Connection,
        deck: Arc<Deck>,
    },
    Select {
        previous: Option<Connection>,
        connection: Connection,
        deck: Arc<Deck>,
    },
}

impl DeckEvent {
    pub fn connection(&self) -> &Connection {
        match self {
            DeckEvent::Create { connection, .. }
            | DeckEvent::Update { connection, .. }
            | DeckEvent::Remove { connection, .. }
            | DeckEvent::Select { connection, .. } => connection,
        }
    }

    pub fn deck(&self) -> &Arc<Deck> {
        match self {
            DeckEvent::Create { deck, .. }
            | DeckEvent::Update { deck, .. }
            | DeckEvent::Remove { deck, .. }
            | DeckEvent::Select { deck, .. } => deck,
        }
    }
}

/// Ordered set of connections with at most one selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deck {
    connections: Vec<Connection>,
    selected_id: ConnectionId,
}

impl Deck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id() == id)
    }

    /// Selected id, nil when nothing is selected.
    pub fn selected_id(&self) -> ConnectionId {
        self.selected_id
    }

    pub fn selected(&self) -> Option<&Connection> {
        if self.selected_id.is_nil() {
            return None;
        }
        self.get(self.selected_id)
    }

    /// Build a connection from the arguments and add it to the deck.
    pub fn create(
        &mut self,
        name: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        options: impl IntoIterator<Item = ConnectionOption>,
    ) -> Result<DeckEvent, CoreError> {
        let connection = Connection::new(name, access_key, secret_key, bucket, options);
        connection.validate()?;
        self.insert(connection.clone())?;
        Ok(DeckEvent::Create {
            connection,
            deck: Arc::new(self.clone()),
        })
    }

    /// Add an already-built connection, e.g. one restored from storage.
    pub fn insert(&mut self, connection: Connection) -> Result<(), CoreError> {
        if connection.id().is_nil() {
            return Err(CoreError::Invalid("connection id is nil".to_string()));
        }
        if self.get(connection.id()).is_some() {
            return Err(CoreError::Invalid(format!(
                "connection {} already exists",
                connection.id()
            )));
        }
        self.connections.push(connection);
        Ok(())
    }

    /// Apply `updates` to the connection with `id`.
    ///
    /// Returns `None` when nothing changed: updates that repeat the current
    /// values, or anything but clearing the flag on a read-only connection.
    pub fn update(
        &mut self,
        id: ConnectionId,
        updates: &[ConnectionUpdate],
    ) -> Result<Option<DeckEvent>, CoreError> {
        let connection = self
            .connections
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| CoreError::NotFound(format!("connection {id}")))?;

        // The revision moves by at most one per update call.
        let mut candidate = connection.clone();
        let changed = updates
            .iter()
            .fold(false, |changed, update| candidate.apply(update) | changed);
        if !changed {
            return Ok(None);
        }
        candidate = candidate.restore(connection.revision() + 1);
        candidate.validate()?;
        *connection = candidate.clone();
        Ok(Some(DeckEvent::Update {
            connection: candidate,
            deck: Arc::new(self.clone()),
        }))
    }

    /// Remove the connection with `id`; clears the selection if it pointed
    /// at it.
    pub fn remove(&mut self, id: ConnectionId) -> Result<DeckEvent, CoreError> {
        let index = self
            .connections
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| CoreError::NotFound(format!("connection {id}")))?;
        let connection = self.connections.remove(index);
        if self.selected_id == id {
            self.selected_id = ConnectionId::nil();
        }
        Ok(DeckEvent::Remove {
            connection,
            deck: Arc::new(self.clone()),
        })
    }

    /// Select the connection with `id`. Selection is untouched on failure.
    pub fn select(&mut self, id: ConnectionId) -> Result<DeckEvent, CoreError> {
        let connection = self
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("connection {id}")))?;
        let previous = self.selected().cloned();
        self.selected_id = id;
        Ok(DeckEvent::Select {
            previous,
            connection,
            deck: Arc::new(self.clone()),
        })
    }
}
