#![deny(unsafe_code)]

/// Client-side mirror of a chat server's conversations and messages.
///
/// The coordinator keeps the local view consistent with the server while
/// mutations are in flight; the store and timeline are plain state it owns.
pub mod coordinator;
pub mod driver;
pub mod outcome;
pub mod send;
/// Settings persistence.
pub mod settings;
pub mod store;
pub mod timeline;
pub mod view;

#[cfg(test)]
mod testing;

pub use coordinator::{ChatCoordinator, ChatState, SyncPolicy};
pub use outcome::{MutationOutcome, Notice, Revert, SendOutcome};
pub use settings::{ClientSettings, SettingsError, SettingsStore};
pub use view::{ViewEntry, ViewSnapshot};
