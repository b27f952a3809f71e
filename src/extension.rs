//! Extension entry points
//!
//! `activate` wires the Beef language session and the workspace editor
//! into a host and returns the [`Extension`] that owns them until
//! `deactivate`.

use tracing::{info, warn};

use crate::host::{ExtensionContext, ExtensionHost, RegistrationError, StatusBarAlignment};
use crate::session::config::{CLIENT_ID, CLIENT_NAME};
use crate::session::{Session, SessionConfig, SessionError, TextDocument};
use crate::workspace_editor::WorkspaceEditorProvider;

/// Id of the status bar item created at activation
pub const STATUS_ITEM_ID: &str = "beef-lsp";

pub const STATUS_ITEM_PRIORITY: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),
}

/// One activation: the session plus everything disposed with it
pub struct Extension {
    session: Session,
    context: ExtensionContext,
}

impl Extension {
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub fn context(&self) -> &ExtensionContext {
        &self.context
    }

    /// Route a document opened in the host
    pub async fn open_document(&self, document: TextDocument) -> Result<bool, SessionError> {
        self.session.open_document(document).await
    }

    /// Route a document closed in the host
    pub async fn close_document(&self, uri: &str) -> Result<bool, SessionError> {
        self.session.close_document(uri).await
    }
}

/// Show the starting status, start the session and register the workspace editor
pub async fn activate(
    host: &dyn ExtensionHost,
    config: SessionConfig,
) -> Result<Extension, ExtensionError> {
    info!("Activating {} ({})", CLIENT_NAME, CLIENT_ID);

    let status_item =
        host.create_status_bar_item(STATUS_ITEM_ID, StatusBarAlignment::Left, STATUS_ITEM_PRIORITY);
    let mut session = Session::new(config, status_item);
    session.start()?;

    let mut context = ExtensionContext::new();
    if let Err(e) = WorkspaceEditorProvider::register(&mut context, host) {
        session.stop().await;
        return Err(e.into());
    }

    Ok(Extension { session, context })
}

/// Hide and dispose the status item, close the session, release subscriptions
pub async fn deactivate(extension: Extension) {
    let Extension {
        mut session,
        mut context,
    } = extension;

    session.stop().await;
    context.dispose_all();

    if let Some(error) = session.last_error() {
        warn!("Session ended without connecting: {}", error);
    }
    info!("{} deactivated", CLIENT_NAME);
}
