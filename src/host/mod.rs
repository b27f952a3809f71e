//! Host editor surface
//!
//! The editor that loads this client is an external collaborator. These
//! traits are the only seams the client needs from it: a status bar item,
//! a registry for custom editor providers and a place to park disposables
//! until deactivation.

pub mod context;
pub mod custom_editor;
pub mod status_bar;
pub mod terminal;
#[cfg(test)]
pub mod testing;

pub use context::ExtensionContext;
pub use custom_editor::{CustomEditorProvider, CustomEditorRegistry, RegistrationError};
pub use status_bar::{StatusBarAlignment, StatusBarItem};
pub use terminal::TerminalHost;

/// Capabilities the host editor exposes to the extension
pub trait ExtensionHost: Send + Sync {
    /// Create a hidden status bar item
    fn create_status_bar_item(
        &self,
        id: &str,
        alignment: StatusBarAlignment,
        priority: i32,
    ) -> Box<dyn StatusBarItem>;

    /// Registry for alternate editor surfaces
    fn custom_editors(&self) -> &CustomEditorRegistry;
}
