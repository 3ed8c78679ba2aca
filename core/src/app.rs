//! Process-wide wiring: the bus, repositories and view-models, built once at
//! startup and torn down by cancelling `done`.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::{BusConfig, EventBus};
use crate::deck::Deck;
use crate::notification::NotificationRepository;
use crate::preferences::Preferences;
use crate::repository::{DeckRepository, DirectoryRepository, SettingsRepository};
use crate::s3::ClientFactory;
use crate::viewmodel::notification::DEFAULT_CAPACITY;
use crate::viewmodel::{
    ConnectionViewModel, EditorViewModel, ExplorerViewModel, NotificationViewModel,
    SettingsViewModel, ThemeHost,
};

pub struct App {
    bus: EventBus,
    notifications: Arc<NotificationRepository>,
    decks: Arc<DeckRepository>,
    settings: SettingsViewModel,
    connections: Arc<ConnectionViewModel>,
    explorer: Arc<ExplorerViewModel>,
    editor: Arc<EditorViewModel>,
    notification_view: Arc<NotificationViewModel>,
}

impl App {
    /// Wire every component and start browsing the persisted selection.
    ///
    /// A deck that cannot be read is replaced by an empty one; the failure
    /// is logged and shown as a notification.
    pub async fn build(
        done: CancellationToken,
        prefs: Arc<dyn Preferences>,
        factory: Arc<dyn ClientFactory>,
        theme: Arc<dyn ThemeHost>,
        config: BusConfig,
    ) -> Self {
        let bus = EventBus::new(done.clone(), config);
        let notifications = Arc::new(NotificationRepository::default());
        let notification_view =
            NotificationViewModel::new(&notifications, DEFAULT_CAPACITY, done);

        let decks = Arc::new(DeckRepository::new(prefs.clone()));
        decks.register(&bus);
        Arc::new(DirectoryRepository::new(decks.clone(), factory)).register(&bus);

        let settings = SettingsViewModel::new(SettingsRepository::new(prefs), theme);

        let deck = decks.get().unwrap_or_else(|err| {
            tracing::warn!("cannot load connections, starting empty: {}", err);
            notifications.notify_error(err);
            Deck::new()
        });
        let selected = deck.selected().cloned();
        tracing::info!(
            "loaded {} connections, selected: {}",
            deck.len(),
            selected.as_ref().map_or("none", |c| c.name())
        );

        let connections = ConnectionViewModel::new(bus.clone(), notifications.clone(), deck);
        let explorer =
            ExplorerViewModel::new(bus.clone(), notifications.clone(), settings.settings());
        let editor = EditorViewModel::new(bus.clone(), notifications.clone(), settings.settings());

        editor.start(selected.clone());
        explorer.start(selected).await;

        Self {
            bus,
            notifications,
            decks,
            settings,
            connections,
            explorer,
            editor,
            notification_view,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn notifications(&self) -> &Arc<NotificationRepository> {
        &self.notifications
    }

    pub fn decks(&self) -> &Arc<DeckRepository> {
        &self.decks
    }

    pub fn settings(&self) -> &SettingsViewModel {
        &self.settings
    }

    pub fn connections(&self) -> &Arc<ConnectionViewModel> {
        &self.connections
    }

    pub fn explorer(&self) -> &Arc<ExplorerViewModel> {
        &self.explorer
    }

    pub fn editor(&self) -> &Arc<EditorViewModel> {
        &self.editor
    }

    pub fn notification_view(&self) -> &Arc<NotificationViewModel> {
        &self.notification_view
    }

    /// Close the bus. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.bus.is_closed() {
            tracing::info!("shutting down");
        }
        self.bus.done().cancel();
    }
}
