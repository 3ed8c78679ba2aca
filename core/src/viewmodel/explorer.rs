use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::settings::SettingsHandle;
use super::tree::Tree;
use crate::binding::Binding;
use crate::bus::{types, Event, EventBus, Matcher, Outcome, Payload};
use crate::context::Context;
use crate::deck::{Connection, DeckEvent};
use crate::errors::CoreError;
use crate::explorer::{DirPath, Directory, File, FileOption, State};
use crate::notification::NotificationRepository;
use crate::settings::Settings;

/// Outcomes the explorer reacts to.
fn reaction_types() -> Vec<String> {
    let mut names = vec![
        types::success(types::DECK_SELECT),
        types::success(types::DECK_UPDATE),
        types::success(types::DECK_REMOVE),
    ];
    for base in [
        types::DIRECTORY_LOAD,
        types::DIRECTORY_CREATED,
        types::DIRECTORY_DELETED,
        types::FILE_DELETED,
        types::CONTENT_UPLOADED,
        types::CONTENT_DOWNLOADED,
    ] {
        names.push(types::success(base));
        names.push(types::failure(base));
    }
    names
}

#[derive(Default)]
struct ExplorerState {
    connection: Option<Connection>,
    root: Option<Directory>,
    /// Full paths of files added to the tree ahead of their upload.
    pending_uploads: HashSet<String>,
    /// Parent of every listing request made for the current tree. Cancelled
    /// when the tree is rebuilt, which marks late answers as stale.
    loads: Option<CancellationToken>,
}

impl ExplorerState {
    fn directory_mut(&mut self, path: &DirPath) -> Result<&mut Directory, CoreError> {
        self.root
            .as_mut()
            .and_then(|root| root.find_mut(path))
            .ok_or_else(|| CoreError::NotFound(format!("directory {path}")))
    }
}

/// Browses the selected connection's bucket as a tree.
///
/// The directory tree is only touched under the state lock, and bus
/// reactions run on a single-worker subscriber so they apply in publish
/// order.
pub struct ExplorerViewModel {
    bus: EventBus,
    notifications: Arc<NotificationRepository>,
    settings: SettingsHandle,
    state: Mutex<ExplorerState>,
    tree: Binding<Tree>,
    visible: Binding<bool>,
    last_download_location: Binding<Option<PathBuf>>,
    last_upload_location: Binding<Option<PathBuf>>,
}

impl ExplorerViewModel {
    pub fn new(
        bus: EventBus,
        notifications: Arc<NotificationRepository>,
        settings: SettingsHandle,
    ) -> Arc<Self> {
        let vm = Arc::new(Self {
            bus: bus.clone(),
            notifications,
            settings,
            state: Mutex::new(ExplorerState::default()),
            tree: Binding::default(),
            visible: Binding::new(false),
            last_download_location: Binding::default(),
            last_upload_location: Binding::default(),
        });

        let mut subscriber = bus.subscribe();
        let this = vm.clone();
        subscriber.on(Matcher::is_one_of(reaction_types()), move |event| {
            let this = this.clone();
            async move { this.react(event).await }
        });
        subscriber.listen_with_workers(1);
        vm
    }

    pub fn tree(&self) -> &Binding<Tree> {
        &self.tree
    }

    pub fn visible(&self) -> &Binding<bool> {
        &self.visible
    }

    pub fn last_download_location(&self) -> &Binding<Option<PathBuf>> {
        &self.last_download_location
    }

    pub fn last_upload_location(&self) -> &Binding<Option<PathBuf>> {
        &self.last_upload_location
    }

    /// The connection being browsed.
    pub fn connection(&self) -> Option<Connection> {
        self.lock().connection.clone()
    }

    /// Snapshot of the directory at `path`, if it is part of the loaded tree.
    pub fn directory(&self, path: &DirPath) -> Option<Directory> {
        self.lock()
            .root
            .as_ref()
            .and_then(|root| root.find(path))
            .cloned()
    }

    /// Drop the current tree and browse `selected` from its root. `None`
    /// hides the tree. Listings still in flight for the old tree are
    /// cancelled and their answers ignored.
    pub async fn start(&self, selected: Option<Connection>) {
        let request = {
            let mut state = self.lock();
            state.pending_uploads.clear();
            if let Some(previous) = state.loads.take() {
                previous.cancel();
            }
            match selected {
                None => {
                    state.connection = None;
                    state.root = None;
                    self.refresh(&state);
                    self.visible.set(false);
                    None
                }
                Some(connection) => {
                    tracing::info!("browsing connection {}", connection.name());
                    let mut root = Directory::root(connection.id());
                    if let Err(err) = root.load() {
                        tracing::warn!("cannot load root of {}: {}", connection.name(), err);
                    }
                    let loads = self.bus.done().child_token();
                    let request = Payload::DirectoryLoad {
                        connection_id: connection.id(),
                        path: DirPath::root(),
                        directory: None,
                    };
                    state.connection = Some(connection);
                    state.root = Some(root);
                    state.loads = Some(loads.clone());
                    self.refresh(&state);
                    self.visible.set(true);
                    Some((loads, request))
                }
            }
        };
        if let Some((loads, payload)) = request {
            self.publish_under(&loads, payload).await;
        }
    }

    /// Load `path` on first interaction, open it once loaded.
    pub async fn open_directory(&self, path: &DirPath) -> Result<(), CoreError> {
        let request = {
            let mut state = self.lock();
            let connection_id = self.current(&state)?.id();
            let loads = state.loads.clone();
            let directory = state.directory_mut(path)?;
            let request = if matches!(directory.state(), State::NotLoaded) {
                directory.load()?;
                Some((
                    loads,
                    Payload::DirectoryLoad {
                        connection_id,
                        path: path.clone(),
                        directory: None,
                    },
                ))
            } else {
                if directory.is_loaded() && !directory.is_opened() {
                    directory.open()?;
                }
                None
            };
            self.refresh(&state);
            request
        };
        match request {
            Some((Some(loads), payload)) => self.publish_under(&loads, payload).await,
            Some((None, payload)) => self.publish(payload).await,
            None => {}
        }
        Ok(())
    }

    pub fn close_directory(&self, path: &DirPath) -> Result<(), CoreError> {
        let mut state = self.lock();
        self.current(&state)?;
        let directory = state.directory_mut(path)?;
        if directory.is_opened() {
            directory.close()?;
            self.refresh(&state);
        }
        Ok(())
    }

    /// Add `name` under `parent` and ask the repository to create it. The
    /// entry is removed again if creation fails.
    pub async fn create_directory(&self, parent: &DirPath, name: &str) -> Result<(), CoreError> {
        let payload = {
            let mut state = self.lock();
            let Some(connection) = self.writable(&state)? else {
                return Ok(());
            };
            let directory = state.directory_mut(parent)?.new_sub_directory(name)?;
            self.refresh(&state);
            Payload::DirectoryCreated {
                connection_id: connection.id(),
                directory,
            }
        };
        self.publish(payload).await;
        Ok(())
    }

    /// Delete the directory marker of `path`. The tree changes once the
    /// repository confirms.
    pub async fn delete_directory(&self, path: &DirPath) -> Result<(), CoreError> {
        let payload = {
            let mut state = self.lock();
            let Some(connection) = self.writable(&state)? else {
                return Ok(());
            };
            if path.is_root() {
                return Err(CoreError::Invalid("cannot delete the root directory".to_string()));
            }
            state.directory_mut(path)?;
            Payload::DirectoryDeleted {
                connection_id: connection.id(),
                path: path.clone(),
            }
        };
        self.publish(payload).await;
        Ok(())
    }

    pub async fn delete_file(&self, file: &File) -> Result<(), CoreError> {
        let payload = {
            let state = self.lock();
            let Some(connection) = self.writable(&state)? else {
                return Ok(());
            };
            Payload::FileDeleted {
                connection_id: connection.id(),
                file: file.clone(),
            }
        };
        self.publish(payload).await;
        Ok(())
    }

    /// Upload `local_path` into `directory`. The file shows up in the tree
    /// right away and disappears again if the upload fails.
    pub async fn upload_file(&self, local_path: &Path, directory: &DirPath) -> Result<(), CoreError> {
        let writable = self.writable(&self.lock())?.is_some();
        if !writable {
            return Ok(());
        }

        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| CoreError::Technical(format!("{}: {e}", local_path.display())))?;
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::Invalid(format!("{} has no file name", local_path.display())))?;
        let file = File::new(
            name,
            directory.clone(),
            [
                FileOption::Size(i64::try_from(metadata.len()).unwrap_or(i64::MAX)),
                FileOption::LastModified(Utc::now()),
            ],
        )?;

        let payload = {
            let mut state = self.lock();
            // Selection may have changed while reading metadata.
            let Some(connection) = self.writable(&state)? else {
                return Ok(());
            };
            let target = state.directory_mut(directory)?;
            if target.files()?.iter().all(|f| f.name() != file.name()) {
                target.add_file(file.clone())?;
                state.pending_uploads.insert(file.full_path());
                self.refresh(&state);
            }
            Payload::ContentUploaded {
                connection_id: connection.id(),
                local_path: local_path.to_path_buf(),
                file,
            }
        };
        self.last_upload_location
            .set(local_path.parent().map(Path::to_path_buf));
        self.publish(payload).await;
        Ok(())
    }

    /// Download `file` to `local_path`. Allowed on read-only connections.
    pub async fn download_file(&self, file: &File, local_path: &Path) -> Result<(), CoreError> {
        let payload = {
            let state = self.lock();
            Payload::ContentDownloaded {
                connection_id: self.current(&state)?.id(),
                file: file.clone(),
                local_path: local_path.to_path_buf(),
            }
        };
        self.last_download_location
            .set(local_path.parent().map(Path::to_path_buf));
        self.publish(payload).await;
        Ok(())
    }

    async fn react(&self, event: Event) {
        if let Payload::Deck(deck_event) = &event.payload {
            self.react_to_deck(deck_event).await;
            return;
        }

        let mut state = self.lock();
        let current = state.connection.as_ref().map(Connection::id);
        if current != Some(event.payload.connection_id()) {
            tracing::debug!("ignoring {} for another connection", event.type_name());
            return;
        }
        if matches!(event.payload, Payload::DirectoryLoad { .. }) && event.ctx.is_cancelled() {
            tracing::debug!("ignoring stale {}", event.type_name());
            return;
        }

        if let Err(err) = self.apply(&mut state, &event) {
            tracing::warn!("cannot apply {}: {}", event.type_name(), err);
        }
        self.refresh(&state);
        drop(state);

        if let Some(err) = event.error() {
            self.notifications.notify_error(err.clone());
        }
    }

    async fn react_to_deck(&self, event: &DeckEvent) {
        let current = self.connection().map(|c| c.id());
        let restart = match event {
            DeckEvent::Select { connection, .. } => Some(Some(connection.clone())),
            DeckEvent::Update { connection, .. } if current == Some(connection.id()) => {
                Some(Some(connection.clone()))
            }
            DeckEvent::Remove { connection, deck } if current == Some(connection.id()) => {
                Some(deck.selected().cloned())
            }
            _ => None,
        };
        if let Some(selected) = restart {
            self.start(selected).await;
        }
    }

    fn apply(&self, state: &mut ExplorerState, event: &Event) -> Result<(), CoreError> {
        let succeeded = matches!(event.outcome, Outcome::Success);
        match &event.payload {
            Payload::DirectoryLoad {
                path, directory, ..
            } => {
                let target = state.directory_mut(path)?;
                if !matches!(target.state(), State::Loading) {
                    return Ok(());
                }
                match directory.clone().filter(|_| succeeded) {
                    Some(loaded) => {
                        target.set_loaded(Some(loaded.into_listing()?))?;
                        target.open()?;
                    }
                    None => target.set_loaded(None)?,
                }
            }
            Payload::DirectoryCreated { directory, .. } => {
                if !succeeded {
                    state
                        .directory_mut(directory.parent_path())?
                        .remove_sub_directory(directory.name())?;
                }
            }
            Payload::DirectoryDeleted { path, .. } => {
                if succeeded {
                    state
                        .directory_mut(&path.parent_path())?
                        .remove_sub_directory(path.directory_name())?;
                }
            }
            Payload::FileDeleted { file, .. } => {
                if succeeded {
                    state
                        .directory_mut(file.directory_path())?
                        .remove_file(file.name())?;
                }
            }
            Payload::ContentUploaded { file, .. } => {
                let speculative = state.pending_uploads.remove(&file.full_path());
                let target = state.directory_mut(file.directory_path())?;
                if succeeded {
                    target.remove_file(file.name())?;
                    target.add_file(file.clone())?;
                    self.notifications
                        .notify_info(format!("uploaded {}", file.full_path()));
                } else if speculative {
                    target.remove_file(file.name())?;
                }
            }
            Payload::ContentDownloaded {
                file, local_path, ..
            } => {
                if succeeded {
                    self.notifications.notify_info(format!(
                        "downloaded {} to {}",
                        file.full_path(),
                        local_path.display()
                    ));
                }
            }
            Payload::FileLoad { .. } | Payload::Deck(_) => {}
        }
        Ok(())
    }

    fn current<'a>(&self, state: &'a ExplorerState) -> Result<&'a Connection, CoreError> {
        state
            .connection
            .as_ref()
            .ok_or(CoreError::NoConnectionSelected)
    }

    /// The current connection if it accepts writes. A read-only connection
    /// produces an info notification and `None`.
    fn writable(&self, state: &ExplorerState) -> Result<Option<Connection>, CoreError> {
        let connection = self.current(state)?;
        if connection.is_read_only() {
            self.notifications
                .notify_info(format!("connection {} is read-only", connection.name()));
            return Ok(None);
        }
        Ok(Some(connection.clone()))
    }

    async fn publish(&self, payload: Payload) {
        self.publish_under(self.bus.done(), payload).await;
    }

    async fn publish_under(&self, parent: &CancellationToken, payload: Payload) {
        let timeout = self.settings.with(Settings::timeout);
        let ctx = Context::child_of(parent).with_timeout(timeout);
        self.bus.publish(Event::new(ctx, payload)).await;
    }

    fn refresh(&self, state: &ExplorerState) {
        self.tree
            .set(state.root.as_ref().map(Tree::from_root).unwrap_or_default());
    }

    fn lock(&self) -> MutexGuard<'_, ExplorerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
