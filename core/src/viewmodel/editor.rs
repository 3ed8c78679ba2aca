use std::collections::HashMap;
use std::io::SeekFrom;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::settings::SettingsHandle;
use crate::binding::Binding;
use crate::bus::{types, Event, EventBus, Matcher, Outcome, Payload};
use crate::context::Context;
use crate::deck::{Connection, DeckEvent};
use crate::errors::CoreError;
use crate::explorer::File;
use crate::notification::NotificationRepository;
use crate::s3::SharedContent;
use crate::settings::Settings;

/// One open file. `is_loaded` turns true once the content arrived or the
/// load failed, in which case `error_msg` is set.
pub struct OpenedEditor {
    file: File,
    content: Binding<String>,
    is_loaded: Binding<bool>,
    error_msg: Binding<String>,
    handle: Mutex<Option<SharedContent>>,
}

impl std::fmt::Debug for OpenedEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedEditor")
            .field("file", &self.file)
            .field("content", &self.content)
            .field("is_loaded", &self.is_loaded)
            .field("error_msg", &self.error_msg)
            .finish_non_exhaustive()
    }
}

impl OpenedEditor {
    fn new(file: File) -> Self {
        Self {
            file,
            content: Binding::default(),
            is_loaded: Binding::new(false),
            error_msg: Binding::default(),
            handle: Mutex::new(None),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn content(&self) -> &Binding<String> {
        &self.content
    }

    pub fn is_loaded(&self) -> &Binding<bool> {
        &self.is_loaded
    }

    pub fn error_msg(&self) -> &Binding<String> {
        &self.error_msg
    }

    fn handle(&self) -> Option<SharedContent> {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_handle(&self, handle: Option<SharedContent>) -> Option<SharedContent> {
        std::mem::replace(
            &mut *self.handle.lock().unwrap_or_else(PoisonError::into_inner),
            handle,
        )
    }

    fn fail(&self, message: String) {
        self.error_msg.set(message);
        self.is_loaded.set(true);
    }
}

/// Text editors keyed by the file's full path.
pub struct EditorViewModel {
    bus: EventBus,
    notifications: Arc<NotificationRepository>,
    settings: SettingsHandle,
    connection: Mutex<Option<Connection>>,
    editors: Mutex<HashMap<String, Arc<OpenedEditor>>>,
    focused: Binding<Option<String>>,
}

impl EditorViewModel {
    pub fn new(
        bus: EventBus,
        notifications: Arc<NotificationRepository>,
        settings: SettingsHandle,
    ) -> Arc<Self> {
        let vm = Arc::new(Self {
            bus: bus.clone(),
            notifications,
            settings,
            connection: Mutex::new(None),
            editors: Mutex::new(HashMap::new()),
            focused: Binding::default(),
        });

        let mut subscriber = bus.subscribe();
        let this = vm.clone();
        subscriber.on(
            Matcher::is_one_of([
                types::success(types::FILE_LOAD),
                types::failure(types::FILE_LOAD),
                types::success(types::DECK_SELECT),
                types::success(types::DECK_UPDATE),
                types::success(types::DECK_REMOVE),
            ]),
            move |event| {
                let this = this.clone();
                async move { this.react(event).await }
            },
        );
        subscriber.listen_with_workers(1);
        vm
    }

    /// Full path of the editor that should have focus.
    pub fn focused(&self) -> &Binding<Option<String>> {
        &self.focused
    }

    pub fn editor(&self, path: &str) -> Option<Arc<OpenedEditor>> {
        self.lock_editors().get(path).cloned()
    }

    /// Paths of the open editors, sorted.
    pub fn opened(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.lock_editors().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Track `selected` without touching open editors. Used at startup.
    pub fn start(&self, selected: Option<Connection>) {
        *self.lock_connection() = selected;
    }

    /// Open an editor on `file` and request its content.
    pub async fn open(&self, file: &File) -> Result<Arc<OpenedEditor>, CoreError> {
        let connection_id = self
            .lock_connection()
            .as_ref()
            .map(Connection::id)
            .ok_or(CoreError::NoConnectionSelected)?;

        let path = file.full_path();
        let editor = {
            let mut editors = self.lock_editors();
            if editors.contains_key(&path) {
                self.focused.set(Some(path.clone()));
                return Err(CoreError::EditorAlreadyOpened(path));
            }
            let max = self.max_preview_size();
            if u64::try_from(file.size_bytes()).is_ok_and(|size| size > max) {
                return Err(CoreError::Invalid(format!(
                    "{path} is larger than the preview limit of {max} bytes"
                )));
            }
            let editor = Arc::new(OpenedEditor::new(file.clone()));
            editors.insert(path.clone(), editor.clone());
            editor
        };
        self.focused.set(Some(path));

        let ctx = Context::child_of(self.bus.done()).with_timeout(self.settings.with(Settings::timeout));
        self.bus
            .publish(Event::new(
                ctx,
                Payload::FileLoad {
                    connection_id,
                    file: file.clone(),
                    content: None,
                },
            ))
            .await;
        Ok(editor)
    }

    /// Replace the object behind `path` with `text`.
    pub async fn save(&self, path: &str, text: &str) -> Result<(), CoreError> {
        match self.lock_connection().as_ref() {
            None => return Err(CoreError::NoConnectionSelected),
            Some(connection) if connection.is_read_only() => {
                return Err(CoreError::ReadOnly(connection.name().to_string()));
            }
            Some(_) => {}
        }
        let editor = self
            .editor(path)
            .ok_or_else(|| CoreError::NotFound(format!("editor {path}")))?;
        let handle = editor
            .handle()
            .ok_or_else(|| CoreError::NotLoaded(path.to_string()))?;

        let bytes = text.as_bytes();
        handle.lock().await.replace(bytes).await?;

        tracing::info!("saved {} ({} bytes)", path, bytes.len());
        editor.content.set(text.to_string());
        Ok(())
    }

    /// Close the editor on `path`, if open.
    pub async fn close(&self, path: &str) {
        let removed = self.lock_editors().remove(path);
        if let Some(editor) = removed {
            if self.focused.with(|f| f.as_deref() == Some(path)) {
                self.focused.set(None);
            }
            close_handle(editor.set_handle(None)).await;
        }
    }

    pub async fn close_all(&self) {
        let editors: Vec<_> = self.lock_editors().drain().map(|(_, e)| e).collect();
        if !editors.is_empty() {
            tracing::debug!("closing {} editors", editors.len());
        }
        self.focused.set(None);
        for editor in editors {
            close_handle(editor.set_handle(None)).await;
        }
    }

    async fn react(&self, event: Event) {
        match &event.payload {
            Payload::Deck(deck_event) => self.react_to_deck(deck_event).await,
            Payload::FileLoad { file, content, .. } => {
                let current = self.lock_connection().as_ref().map(Connection::id);
                let editor = self.editor(&file.full_path());
                let editor = match editor {
                    Some(editor) if current == Some(event.payload.connection_id()) => editor,
                    _ => {
                        tracing::debug!("no editor waiting for {}", file.full_path());
                        close_handle(content.clone()).await;
                        return;
                    }
                };
                match (&event.outcome, content) {
                    (Outcome::Success, Some(content)) => self.fill(&editor, content.clone()).await,
                    _ => {
                        let message = event
                            .error()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| format!("cannot load {}", file.full_path()));
                        editor.fail(message);
                        if let Some(err) = event.error() {
                            self.notifications.notify_error(err.clone());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    async fn fill(&self, editor: &OpenedEditor, handle: SharedContent) {
        let max = self.max_preview_size();
        let mut bytes = Vec::new();
        let loaded = {
            let mut content = handle.lock().await;
            if content.len() > max {
                Err(CoreError::Invalid(format!(
                    "{} is larger than the preview limit of {} bytes",
                    editor.file.full_path(),
                    max
                )))
            } else if content.exists() {
                content
                    .seek(SeekFrom::Start(0))
                    .and_then(|_| content.read_to_end(&mut bytes))
                    .map_err(CoreError::from)
            } else {
                Ok(0)
            }
        };

        match loaded {
            Ok(_) => {
                editor.content.set(String::from_utf8_lossy(&bytes).into_owned());
                close_handle(editor.set_handle(Some(handle))).await;
                editor.is_loaded.set(true);
            }
            Err(err) => {
                editor.fail(err.to_string());
                close_handle(Some(handle)).await;
            }
        }
    }

    async fn react_to_deck(&self, event: &DeckEvent) {
        let current = self.lock_connection().as_ref().map(Connection::id);
        let next = match event {
            DeckEvent::Select { connection, .. } if current != Some(connection.id()) => {
                Some(Some(connection.clone()))
            }
            DeckEvent::Update { connection, .. } if current == Some(connection.id()) => {
                Some(Some(connection.clone()))
            }
            DeckEvent::Remove { connection, deck } if current == Some(connection.id()) => {
                Some(deck.selected().cloned())
            }
            _ => None,
        };
        if let Some(next) = next {
            self.close_all().await;
            *self.lock_connection() = next;
        }
    }

    fn max_preview_size(&self) -> u64 {
        self.settings.with(Settings::max_file_preview_size_bytes)
    }

    fn lock_editors(&self) -> MutexGuard<'_, HashMap<String, Arc<OpenedEditor>>> {
        self.editors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_connection(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn close_handle(handle: Option<SharedContent>) {
    if let Some(handle) = handle {
        if let Err(err) = handle.lock().await.close().await {
            tracing::warn!("closing content failed: {}", err);
        }
    }
}
