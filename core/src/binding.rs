//! Observable cells for view-models.
//!
//! A [`Binding`] wraps a `tokio::sync::watch` channel: the view-model
//! writes, any number of UI observers read the latest value or await
//! changes.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Binding<T> {
    tx: watch::Sender<T>,
}

impl<T> Binding<T> {
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx }
    }

    /// Replace the value and notify observers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutate the value in place and notify observers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Receiver that sees the current value and every later change.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Run `f` against the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }
}

impl<T: Clone> Binding<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: Default> Default for Binding<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let b = Binding::new(1);
        b.set(2);
        assert_eq!(b.get(), 2);
        b.update(|v| *v += 3);
        assert_eq!(b.get(), 5);
        assert_eq!(b.with(|v| *v * 2), 10);
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let b = Binding::new(String::new());
        let mut rx = b.subscribe();
        b.set("hello".to_string());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), "hello");
    }
}
