//! Status bar item seam

/// Which side of the status bar an item sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBarAlignment {
    Left,
}

/// A status bar entry owned by the extension
///
/// Items start hidden. After `dispose` the host may release the item and
/// further calls are ignored.
pub trait StatusBarItem: Send {
    fn set_name(&mut self, name: &str);

    fn set_text(&mut self, text: &str);

    fn set_tooltip(&mut self, tooltip: &str);

    fn show(&mut self);

    fn hide(&mut self);

    fn dispose(&mut self);
}
