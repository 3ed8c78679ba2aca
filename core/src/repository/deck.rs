//! Deck persistence in the preferences store.
//!
//! The deck is stored as one JSON array under [`ALL_CONNECTIONS_KEY`].

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::ConnectionSource;
use crate::bus::{types, Event, EventBus, Matcher, Payload};
use crate::deck::{Connection, ConnectionId, ConnectionOption, Deck, DeckEvent};
use crate::errors::CoreError;
use crate::preferences::Preferences;

pub const ALL_CONNECTIONS_KEY: &str = "allConnections";

const AWS_TYPE: &str = "aws";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Persisted shape of one connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ConnectionDto {
    id: String,
    revision: u64,
    name: String,
    server: String,
    access_key: String,
    secret_key: String,
    bucket: String,
    #[serde(skip_serializing_if = "is_false")]
    selected: bool,
    region: String,
    #[serde(rename = "type")]
    provider_type: String,
    use_tls: bool,
    read_only: bool,
}

impl ConnectionDto {
    fn from_connection(connection: &Connection, selected: bool) -> Self {
        Self {
            id: connection.id().to_string(),
            revision: connection.revision(),
            name: connection.name().to_string(),
            server: connection.server().to_string(),
            access_key: connection.access_key().to_string(),
            secret_key: connection.secret_key().to_string(),
            bucket: connection.bucket().to_string(),
            selected,
            region: connection.region().to_string(),
            provider_type: connection.provider().type_str().to_string(),
            use_tls: connection.use_tls(),
            read_only: connection.is_read_only(),
        }
    }

    /// `None` for entries without a usable id.
    fn into_connection(self) -> Option<Connection> {
        let id = match ConnectionId::parse(&self.id) {
            Ok(id) if !id.is_nil() => id,
            _ => {
                tracing::warn!("dropping persisted connection {:?} without id", self.name);
                return None;
            }
        };
        // Unknown provider types fall back to S3-like.
        let provider = if self.provider_type == AWS_TYPE {
            ConnectionOption::Aws {
                region: self.region,
            }
        } else {
            ConnectionOption::S3Like {
                server: self.server,
                use_tls: self.use_tls,
            }
        };
        let connection = Connection::new(
            self.name,
            self.access_key,
            self.secret_key,
            self.bucket,
            [
                ConnectionOption::Id(id),
                provider,
                ConnectionOption::ReadOnly(self.read_only),
            ],
        );
        Some(connection.restore(self.revision))
    }
}

/// Reads and writes the deck; answers `deck.*` requests on the bus.
pub struct DeckRepository {
    prefs: Arc<dyn Preferences>,
    // Serializes read-modify-write cycles against the store.
    lock: Mutex<()>,
}

impl DeckRepository {
    pub fn new(prefs: Arc<dyn Preferences>) -> Self {
        Self {
            prefs,
            lock: Mutex::new(()),
        }
    }

    /// Load the persisted deck. Empty or `null` content yields an empty deck.
    pub fn get(&self) -> Result<Deck, CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read()
    }

    /// Persist `deck` in insertion order, marking the selected entry.
    pub fn save(&self, deck: &Deck) -> Result<(), CoreError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(deck)
    }

    /// Write the persisted deck as JSON to `writer`.
    pub fn export(&self, mut writer: impl Write) -> Result<(), CoreError> {
        let deck = self.get()?;
        serde_json::to_writer_pretty(&mut writer, &Self::to_dtos(&deck))
            .map_err(|e| CoreError::Technical(format!("failed to export connections: {e}")))?;
        writer
            .flush()
            .map_err(|e| CoreError::Technical(format!("failed to export connections: {e}")))
    }

    /// Subscribe to `deck.*` requests. Call once per bus.
    pub fn register(self: &Arc<Self>, bus: &EventBus) {
        let mut subscriber = bus.subscribe();
        let repo = self.clone();
        let publisher = bus.clone();
        subscriber.on(Matcher::is_one_of(types::DECK_TYPES), move |event| {
            let repo = repo.clone();
            let bus = publisher.clone();
            async move {
                let answer = repo.handle(&event);
                bus.publish(answer).await;
            }
        });
        subscriber.listen_with_workers(1);
    }

    fn handle(&self, event: &Event) -> Event {
        let Payload::Deck(deck_event) = &event.payload else {
            return event.failure(CoreError::Technical(format!(
                "unexpected payload for {}",
                event.type_name()
            )));
        };

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match deck_event {
            DeckEvent::Update { connection, deck } => self
                .check_revision(connection)
                .and_then(|()| self.write(deck)),
            _ => self.write(deck_event.deck()),
        };

        match result {
            Ok(()) => {
                tracing::info!(
                    "persisted {} for connection {}",
                    event.type_name(),
                    deck_event.connection().name()
                );
                event.success()
            }
            Err(err) => {
                tracing::error!("failed to persist {}: {}", event.type_name(), err);
                event.failure(err)
            }
        }
    }

    /// Reject an update built on a revision older than the stored one.
    fn check_revision(&self, connection: &Connection) -> Result<(), CoreError> {
        let stored = self.read()?;
        match stored.get(connection.id()) {
            Some(current) if current.revision() > connection.revision() => {
                Err(CoreError::Technical(format!(
                    "connection {} was modified elsewhere (stored revision {}, update revision {})",
                    connection.name(),
                    current.revision(),
                    connection.revision()
                )))
            }
            _ => Ok(()),
        }
    }

    fn read(&self) -> Result<Deck, CoreError> {
        let raw = self.prefs.string(ALL_CONNECTIONS_KEY);
        let mut deck = Deck::new();
        if raw.trim().is_empty() || raw.trim() == "null" {
            return Ok(deck);
        }

        let dtos: Vec<ConnectionDto> = serde_json::from_str(&raw).map_err(|e| {
            CoreError::Technical(format!("failed to parse {ALL_CONNECTIONS_KEY}: {e}"))
        })?;

        let mut selected = None;
        for dto in dtos {
            let is_selected = dto.selected;
            let Some(connection) = dto.into_connection() else {
                continue;
            };
            let id = connection.id();
            if let Err(err) = deck.insert(connection) {
                tracing::warn!("skipping persisted connection: {}", err);
                continue;
            }
            if is_selected {
                if selected.is_some() {
                    tracing::warn!("more than one persisted connection is selected");
                }
                selected = Some(id);
            }
        }
        if let Some(id) = selected {
            deck.select(id)?;
        }
        Ok(deck)
    }

    fn write(&self, deck: &Deck) -> Result<(), CoreError> {
        let json = serde_json::to_string(&Self::to_dtos(deck)).map_err(|e| {
            CoreError::Technical(format!("failed to serialize {ALL_CONNECTIONS_KEY}: {e}"))
        })?;
        self.prefs
            .set_string(ALL_CONNECTIONS_KEY, &json)
            .map_err(|e| CoreError::Technical(format!("failed to save {ALL_CONNECTIONS_KEY}: {e}")))
    }

    fn to_dtos(deck: &Deck) -> Vec<ConnectionDto> {
        let selected = deck.selected_id();
        deck.connections()
            .iter()
            .map(|c| ConnectionDto::from_connection(c, !selected.is_nil() && c.id() == selected))
            .collect()
    }
}

impl ConnectionSource for DeckRepository {
    fn connection(&self, id: ConnectionId) -> Result<Connection, CoreError> {
        self.get()?
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::NotFound(format!("connection {id}")))
    }
}
