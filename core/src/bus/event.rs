use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::types;
use crate::context::Context;
use crate::deck::{ConnectionId, DeckEvent};
use crate::errors::CoreError;
use crate::explorer::{DirPath, Directory, File};
use crate::s3::SharedContent;

/// What an event is about.
#[derive(Clone)]
pub enum Payload {
    Deck(DeckEvent),
    /// Create the marker object for `directory`.
    DirectoryCreated {
        connection_id: ConnectionId,
        directory: Directory,
    },
    DirectoryDeleted {
        connection_id: ConnectionId,
        path: DirPath,
    },
    /// Load request for `path`; the success carries the loaded directory.
    DirectoryLoad {
        connection_id: ConnectionId,
        path: DirPath,
        directory: Option<Directory>,
    },
    /// Open request for `file`; the success carries its content.
    FileLoad {
        connection_id: ConnectionId,
        file: File,
        content: Option<SharedContent>,
    },
    FileDeleted {
        connection_id: ConnectionId,
        file: File,
    },
    ContentUploaded {
        connection_id: ConnectionId,
        local_path: PathBuf,
        file: File,
    },
    ContentDownloaded {
        connection_id: ConnectionId,
        file: File,
        local_path: PathBuf,
    },
}

impl Payload {
    /// Request type name, without outcome suffix.
    pub fn base_type(&self) -> &'static str {
        match self {
            Payload::Deck(DeckEvent::Select { .. }) => types::DECK_SELECT,
            Payload::Deck(DeckEvent::Create { .. }) => types::DECK_CREATE,
            Payload::Deck(DeckEvent::Update { .. }) => types::DECK_UPDATE,
            Payload::Deck(DeckEvent::Remove { .. }) => types::DECK_REMOVE,
            Payload::DirectoryCreated { .. } => types::DIRECTORY_CREATED,
            Payload::DirectoryDeleted { .. } => types::DIRECTORY_DELETED,
            Payload::DirectoryLoad { .. } => types::DIRECTORY_LOAD,
            Payload::FileLoad { .. } => types::FILE_LOAD,
            Payload::FileDeleted { .. } => types::FILE_DELETED,
            Payload::ContentUploaded { .. } => types::CONTENT_UPLOADED,
            Payload::ContentDownloaded { .. } => types::CONTENT_DOWNLOADED,
        }
    }

    /// Connection the event concerns.
    pub fn connection_id(&self) -> ConnectionId {
        match self {
            Payload::Deck(event) => event.connection().id(),
            Payload::DirectoryCreated { connection_id, .. }
            | Payload::DirectoryDeleted { connection_id, .. }
            | Payload::DirectoryLoad { connection_id, .. }
            | Payload::FileLoad { connection_id, .. }
            | Payload::FileDeleted { connection_id, .. }
            | Payload::ContentUploaded { connection_id, .. }
            | Payload::ContentDownloaded { connection_id, .. } => *connection_id,
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Deck(event) => f.debug_tuple("Deck").field(event).finish(),
            Payload::DirectoryCreated { directory, .. } => f
                .debug_struct("DirectoryCreated")
                .field("path", directory.path())
                .finish(),
            Payload::DirectoryDeleted { path, .. } => f
                .debug_struct("DirectoryDeleted")
                .field("path", path)
                .finish(),
            Payload::DirectoryLoad {
                path, directory, ..
            } => f
                .debug_struct("DirectoryLoad")
                .field("path", path)
                .field("loaded", &directory.is_some())
                .finish(),
            Payload::FileLoad { file, content, .. } => f
                .debug_struct("FileLoad")
                .field("file", &file.full_path())
                .field("content", &content.is_some())
                .finish(),
            Payload::FileDeleted { file, .. } => f
                .debug_struct("FileDeleted")
                .field("file", &file.full_path())
                .finish(),
            Payload::ContentUploaded {
                local_path, file, ..
            } => f
                .debug_struct("ContentUploaded")
                .field("local_path", local_path)
                .field("file", &file.full_path())
                .finish(),
            Payload::ContentDownloaded {
                file, local_path, ..
            } => f
                .debug_struct("ContentDownloaded")
                .field("file", &file.full_path())
                .field("local_path", local_path)
                .finish(),
        }
    }
}

/// Whether an event is a request or the answer to one.
#[derive(Debug, Clone)]
pub enum Outcome {
    Request,
    Success,
    Failure(Arc<CoreError>),
}

/// A bus event: request or outcome, with the context the work runs under.
#[derive(Debug, Clone)]
pub struct Event {
    pub ctx: Context,
    pub payload: Payload,
    pub outcome: Outcome,
}

impl Event {
    pub fn new(ctx: Context, payload: Payload) -> Self {
        Self {
            ctx,
            payload,
            outcome: Outcome::Request,
        }
    }

    pub fn deck(event: DeckEvent) -> Self {
        Self::new(Context::background(), Payload::Deck(event))
    }

    /// Namespaced type name including the outcome suffix.
    pub fn type_name(&self) -> String {
        let base = self.payload.base_type();
        match self.outcome {
            Outcome::Request => base.to_string(),
            Outcome::Success => types::success(base),
            Outcome::Failure(_) => types::failure(base),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.outcome, Outcome::Request)
    }

    pub fn error(&self) -> Option<&Arc<CoreError>> {
        match &self.outcome {
            Outcome::Failure(err) => Some(err),
            _ => None,
        }
    }

    /// The `.success` answer carrying the same payload.
    pub fn success(&self) -> Self {
        self.success_with(self.payload.clone())
    }

    /// The `.success` answer carrying `payload`.
    pub fn success_with(&self, payload: Payload) -> Self {
        Self {
            ctx: self.ctx.clone(),
            payload,
            outcome: Outcome::Success,
        }
    }

    /// The `.failure` answer carrying `err`.
    pub fn failure(&self, err: impl Into<Arc<CoreError>>) -> Self {
        Self {
            ctx: self.ctx.clone(),
            payload: self.payload.clone(),
            outcome: Outcome::Failure(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::Deck;

    #[test]
    fn type_names_follow_outcome() {
        let mut deck = Deck::new();
        let created = deck.create("c", "ak", "sk", "b", []).unwrap();
        let event = Event::deck(created);
        assert_eq!(event.type_name(), "deck.create");
        assert!(event.is_request());
        assert_eq!(event.success().type_name(), "deck.create.success");

        let failed = event.failure(CoreError::Technical("disk full".into()));
        assert_eq!(failed.type_name(), "deck.create.failure");
        assert_eq!(
            failed.error().map(|e| e.to_string()).as_deref(),
            Some("Technical error: disk full")
        );
    }

    #[test]
    fn directory_load_names() {
        let id = ConnectionId::new();
        let event = Event::new(
            Context::background(),
            Payload::DirectoryLoad {
                connection_id: id,
                path: DirPath::root(),
                directory: None,
            },
        );
        assert_eq!(event.type_name(), types::DIRECTORY_LOAD);
        assert_eq!(event.payload.connection_id(), id);
        let answered = event.success_with(Payload::DirectoryLoad {
            connection_id: id,
            path: DirPath::root(),
            directory: Some(Directory::root(id)),
        });
        assert_eq!(answered.type_name(), "event.directory.load.success");
    }
}
