//! HTTP collaborators for the chatline sync engine, plus client settings.

pub mod api;
pub mod settings;
pub mod transport;

pub use api::HttpChatApi;
pub use settings::{ClientSettings, SettingsError, SettingsStore};
pub use transport::HttpTransport;
