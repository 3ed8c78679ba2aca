//! UI-facing state. Each view-model owns one concern and exposes it as
//! [`Binding`](crate::binding::Binding) observables.

pub mod connection;
pub mod editor;
pub mod explorer;
pub mod notification;
pub mod settings;
pub mod tree;

pub use connection::ConnectionViewModel;
pub use editor::{EditorViewModel, OpenedEditor};
pub use explorer::ExplorerViewModel;
pub use notification::NotificationViewModel;
pub use settings::{SettingsHandle, SettingsViewModel, ThemeHost};
pub use tree::{Node, Tree, ROOT_ID};
