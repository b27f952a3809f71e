//! Status indicator driven by the session lifecycle

use crate::host::StatusBarItem;
use tracing::debug;

/// Display name of the status item
pub const STATUS_ITEM_NAME: &str = "Beef Lsp Status";

/// Text and tooltip shown by the status item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDescriptor {
    pub text: &'static str,
    pub tooltip: &'static str,
}

impl StatusDescriptor {
    pub const STARTING: StatusDescriptor = StatusDescriptor {
        text: "$(loading~spin) Beef Lsp",
        tooltip: "Status: Starting",
    };

    pub const RUNNING: StatusDescriptor = StatusDescriptor {
        text: "$(check) Beef Lsp",
        tooltip: "Status: Running",
    };
}

/// Owns the host status item for one session
///
/// Moves starting -> running at most once and never back. After
/// `teardown` every call is ignored.
pub struct SessionStatus {
    item: Box<dyn StatusBarItem>,
    current: Option<StatusDescriptor>,
    disposed: bool,
}

impl SessionStatus {
    pub fn new(item: Box<dyn StatusBarItem>) -> Self {
        Self {
            item,
            current: None,
            disposed: false,
        }
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<StatusDescriptor> {
        self.current
    }

    fn apply(&mut self, descriptor: StatusDescriptor) {
        self.item.set_text(descriptor.text);
        self.item.set_tooltip(descriptor.tooltip);
        self.current = Some(descriptor);
    }

    /// Name the item, show "starting" and make it visible
    pub fn show_starting(&mut self) {
        if self.disposed || self.current.is_some() {
            return;
        }
        self.item.set_name(STATUS_ITEM_NAME);
        self.apply(StatusDescriptor::STARTING);
        self.item.show();
    }

    /// Switch to "running"; returns false if nothing changed
    pub fn show_running(&mut self) -> bool {
        if self.disposed || self.current == Some(StatusDescriptor::RUNNING) {
            return false;
        }
        self.apply(StatusDescriptor::RUNNING);
        true
    }

    /// Hide then dispose the item
    pub fn teardown(&mut self) {
        if self.disposed {
            return;
        }
        debug!("Disposing status item");
        self.item.hide();
        self.item.dispose();
        self.disposed = true;
    }
}

impl Drop for SessionStatus {
    fn drop(&mut self) {
        self.teardown();
    }
}
