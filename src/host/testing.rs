//! Recording host for tests

use crate::host::custom_editor::CustomEditorRegistry;
use crate::host::status_bar::{StatusBarAlignment, StatusBarItem};
use crate::host::ExtensionHost;
use std::sync::{Arc, Mutex};

/// Every call made on a [`RecordingStatusBarItem`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Name(String),
    Text(String),
    Tooltip(String),
    Show,
    Hide,
    Dispose,
}

/// Shared view of a status bar item's state
#[derive(Debug, Clone, Default)]
pub struct StatusRecord {
    pub text: String,
    pub tooltip: String,
    pub visible: bool,
    pub disposed: bool,
    pub events: Vec<StatusEvent>,
}

impl StatusRecord {
    pub fn texts(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                StatusEvent::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

pub struct RecordingStatusBarItem {
    record: Arc<Mutex<StatusRecord>>,
}

impl RecordingStatusBarItem {
    pub fn new() -> (Self, Arc<Mutex<StatusRecord>>) {
        let record = Arc::new(Mutex::new(StatusRecord::default()));
        (
            Self {
                record: Arc::clone(&record),
            },
            record,
        )
    }

    fn apply(&mut self, event: StatusEvent) {
        let mut record = self.record.lock().unwrap();
        match &event {
            StatusEvent::Text(text) => record.text = text.clone(),
            StatusEvent::Tooltip(tooltip) => record.tooltip = tooltip.clone(),
            StatusEvent::Show => record.visible = true,
            StatusEvent::Hide => record.visible = false,
            StatusEvent::Dispose => {
                record.visible = false;
                record.disposed = true;
            }
            StatusEvent::Name(_) => {}
        }
        record.events.push(event);
    }
}

impl StatusBarItem for RecordingStatusBarItem {
    fn set_name(&mut self, name: &str) {
        self.apply(StatusEvent::Name(name.to_string()));
    }

    fn set_text(&mut self, text: &str) {
        self.apply(StatusEvent::Text(text.to_string()));
    }

    fn set_tooltip(&mut self, tooltip: &str) {
        self.apply(StatusEvent::Tooltip(tooltip.to_string()));
    }

    fn show(&mut self) {
        self.apply(StatusEvent::Show);
    }

    fn hide(&mut self) {
        self.apply(StatusEvent::Hide);
    }

    fn dispose(&mut self) {
        self.apply(StatusEvent::Dispose);
    }
}

/// Host whose status bar items record into shared state
#[derive(Default)]
pub struct RecordingHost {
    pub created_items: Mutex<Vec<(String, StatusBarAlignment, i32, Arc<Mutex<StatusRecord>>)>>,
    custom_editors: CustomEditorRegistry,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record of the most recently created status bar item
    pub fn last_item(&self) -> Arc<Mutex<StatusRecord>> {
        let items = self.created_items.lock().unwrap();
        Arc::clone(&items.last().expect("no status bar item created").3)
    }
}

impl ExtensionHost for RecordingHost {
    fn create_status_bar_item(
        &self,
        id: &str,
        alignment: StatusBarAlignment,
        priority: i32,
    ) -> Box<dyn StatusBarItem> {
        let (item, record) = RecordingStatusBarItem::new();
        self.created_items
            .lock()
            .unwrap()
            .push((id.to_string(), alignment, priority, record));
        Box::new(item)
    }

    fn custom_editors(&self) -> &CustomEditorRegistry {
        &self.custom_editors
    }
}
