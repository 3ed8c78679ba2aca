use std::sync::{Arc, Mutex, PoisonError};

use crate::binding::Binding;
use crate::bus::{types, Event, EventBus, Matcher};
use crate::deck::{Connection, ConnectionId, ConnectionOption, ConnectionUpdate, Deck};
use crate::errors::CoreError;
use crate::notification::NotificationRepository;

/// Owns the deck and projects it into observables.
///
/// Every mutation is applied to the deck first and then published; the
/// deck repository persists it and answers on the bus.
pub struct ConnectionViewModel {
    bus: EventBus,
    notifications: Arc<NotificationRepository>,
    deck: Mutex<Deck>,
    connections: Binding<Vec<Connection>>,
    selected: Binding<Option<Connection>>,
}

impl ConnectionViewModel {
    pub fn new(
        bus: EventBus,
        notifications: Arc<NotificationRepository>,
        deck: Deck,
    ) -> Arc<Self> {
        let vm = Arc::new(Self {
            bus: bus.clone(),
            notifications,
            connections: Binding::new(deck.connections().to_vec()),
            selected: Binding::new(deck.selected().cloned()),
            deck: Mutex::new(deck),
        });

        let mut subscriber = bus.subscribe();
        let this = vm.clone();
        subscriber.on(
            Matcher::is_one_of(types::DECK_TYPES.map(types::failure)),
            move |event| {
                let this = this.clone();
                async move {
                    if let Some(err) = event.error() {
                        this.notifications.notify_error(err.clone());
                    }
                }
            },
        );
        subscriber.listen_with_workers(1);
        vm
    }

    pub fn connections(&self) -> &Binding<Vec<Connection>> {
        &self.connections
    }

    pub fn selected_binding(&self) -> &Binding<Option<Connection>> {
        &self.selected
    }

    pub fn selected(&self) -> Option<Connection> {
        self.selected.get()
    }

    /// Whether the selected connection is read-only. `false` without a
    /// selection.
    pub fn is_read_only(&self) -> bool {
        self.selected
            .with(|s| s.as_ref().is_some_and(Connection::is_read_only))
    }

    /// Snapshot of the deck.
    pub fn deck(&self) -> Deck {
        self.lock_deck().clone()
    }

    pub async fn create(
        &self,
        name: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        options: impl IntoIterator<Item = ConnectionOption>,
    ) -> Result<ConnectionId, CoreError> {
        let event = self.mutate(|deck| deck.create(name, access_key, secret_key, bucket, options))?;
        let id = event.connection().id();
        self.bus.publish(Event::deck(event)).await;
        Ok(id)
    }

    pub async fn update(
        &self,
        id: ConnectionId,
        updates: &[ConnectionUpdate],
    ) -> Result<(), CoreError> {
        let event = self.mutate(|deck| deck.update(id, updates))?;
        match event {
            Some(event) => self.bus.publish(Event::deck(event)).await,
            None => tracing::debug!("update of connection {} changed nothing", id),
        }
        Ok(())
    }

    pub async fn delete(&self, id: ConnectionId) -> Result<(), CoreError> {
        let event = self.mutate(|deck| deck.remove(id))?;
        self.bus.publish(Event::deck(event)).await;
        Ok(())
    }

    pub async fn select(&self, id: ConnectionId) -> Result<(), CoreError> {
        let event = self.mutate(|deck| deck.select(id))?;
        self.bus.publish(Event::deck(event)).await;
        Ok(())
    }

    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Deck) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut deck = self.lock_deck();
        let event = op(&mut deck)?;
        self.connections.set(deck.connections().to_vec());
        self.selected.set(deck.selected().cloned());
        Ok(event)
    }

    fn lock_deck(&self) -> std::sync::MutexGuard<'_, Deck> {
        self.deck.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
