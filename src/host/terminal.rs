//! Host used by the standalone binary
//!
//! There is no editor window, so the status bar item renders through the
//! log: every visible change becomes one `info` event.

use crate::host::custom_editor::CustomEditorRegistry;
use crate::host::status_bar::{StatusBarAlignment, StatusBarItem};
use crate::host::ExtensionHost;
use tracing::{debug, info};

#[derive(Default)]
pub struct TerminalHost {
    custom_editors: CustomEditorRegistry,
}

impl TerminalHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExtensionHost for TerminalHost {
    fn create_status_bar_item(
        &self,
        id: &str,
        alignment: StatusBarAlignment,
        priority: i32,
    ) -> Box<dyn StatusBarItem> {
        debug!(
            "Creating status bar item {} ({:?}, priority {})",
            id, alignment, priority
        );
        Box::new(LogStatusBarItem::new(id))
    }

    fn custom_editors(&self) -> &CustomEditorRegistry {
        &self.custom_editors
    }
}

/// Status bar item that reports its visible state through tracing
pub struct LogStatusBarItem {
    id: String,
    name: String,
    text: String,
    tooltip: String,
    visible: bool,
    disposed: bool,
}

impl LogStatusBarItem {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            text: String::new(),
            tooltip: String::new(),
            visible: false,
            disposed: false,
        }
    }

    fn render(&self) {
        if self.visible && !self.disposed {
            info!(
                item = %self.id,
                name = %self.name,
                tooltip = %self.tooltip,
                "[status] {}",
                self.text
            );
        }
    }
}

impl StatusBarItem for LogStatusBarItem {
    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn set_text(&mut self, text: &str) {
        if self.disposed || self.text == text {
            return;
        }
        self.text = text.to_string();
        self.render();
    }

    fn set_tooltip(&mut self, tooltip: &str) {
        if self.disposed {
            return;
        }
        self.tooltip = tooltip.to_string();
    }

    fn show(&mut self) {
        if self.disposed || self.visible {
            return;
        }
        self.visible = true;
        self.render();
    }

    fn hide(&mut self) {
        if self.visible {
            debug!("Hiding status bar item {}", self.id);
        }
        self.visible = false;
    }

    fn dispose(&mut self) {
        self.visible = false;
        self.disposed = true;
    }
}
