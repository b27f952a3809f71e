//! Extension context: ownership of resources released at deactivation

use tracing::debug;

/// Something that must be released when the extension deactivates
pub trait Disposable: Send {
    fn dispose(&mut self);
}

/// Per-activation context handed to the extension by the host
#[derive(Default)]
pub struct ExtensionContext {
    subscriptions: Vec<Box<dyn Disposable>>,
}

impl ExtensionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a disposable alive until [`ExtensionContext::dispose_all`]
    pub fn push_subscription(&mut self, disposable: Box<dyn Disposable>) {
        self.subscriptions.push(disposable);
    }

    #[cfg(test)]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Dispose subscriptions in reverse registration order
    pub fn dispose_all(&mut self) {
        debug!("Disposing {} subscriptions", self.subscriptions.len());
        while let Some(mut disposable) = self.subscriptions.pop() {
            disposable.dispose();
        }
    }
}

impl Drop for ExtensionContext {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
