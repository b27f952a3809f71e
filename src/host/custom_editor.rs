//! Custom editor registration
//!
//! A provider claims files by name so the host opens them in an alternate
//! editor surface. The surface itself is opaque here; the registry only
//! records which view type handles which files.

use crate::host::context::Disposable;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("Custom editor view type already registered: {0}")]
    DuplicateViewType(String),

    #[error("Invalid custom editor view type: '{0}'")]
    InvalidViewType(String),
}

/// Provider of an alternate editor surface
pub trait CustomEditorProvider: Send + Sync {
    /// Unique view type, e.g. `beef.workspaceEditor`
    fn view_type(&self) -> &str;

    /// File name pattern: an exact name or `*.ext`
    fn file_name_pattern(&self) -> &str;

    fn matches(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            return false;
        };
        match self.file_name_pattern().strip_prefix('*') {
            Some(suffix) => file_name.ends_with(suffix),
            None => file_name == self.file_name_pattern(),
        }
    }
}

type ProviderMap = BTreeMap<String, Arc<dyn CustomEditorProvider>>;

/// Host-side registry of custom editor providers
#[derive(Clone, Default)]
pub struct CustomEditorRegistry {
    providers: Arc<Mutex<ProviderMap>>,
}

impl CustomEditorRegistry {
    /// Register a provider; the returned handle unregisters it on dispose
    pub fn register(
        &self,
        provider: Arc<dyn CustomEditorProvider>,
    ) -> Result<CustomEditorRegistration, RegistrationError> {
        let view_type = provider.view_type().to_string();
        if view_type.trim().is_empty() || view_type.contains(char::is_whitespace) {
            return Err(RegistrationError::InvalidViewType(view_type));
        }

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let mut providers = self.providers.lock().unwrap();
        if providers.contains_key(&view_type) {
            return Err(RegistrationError::DuplicateViewType(view_type));
        }

        info!(
            "Registered custom editor {} for {}",
            view_type,
            provider.file_name_pattern()
        );
        providers.insert(view_type.clone(), provider);

        Ok(CustomEditorRegistration {
            view_type,
            providers: Arc::downgrade(&self.providers),
            disposed: false,
        })
    }

    /// View type of the editor that should open `path`, if any
    pub fn resolve(&self, path: &Path) -> Option<String> {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        let providers = self.providers.lock().unwrap();
        providers
            .values()
            .find(|provider| provider.matches(path))
            .map(|provider| provider.view_type().to_string())
    }

    #[cfg(test)]
    pub fn is_registered(&self, view_type: &str) -> bool {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.providers.lock().unwrap().contains_key(view_type)
    }
}

/// Handle for a registered provider
pub struct CustomEditorRegistration {
    view_type: String,
    providers: std::sync::Weak<Mutex<ProviderMap>>,
    disposed: bool,
}

impl Disposable for CustomEditorRegistration {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        // Registry may already be gone when the host shuts down first
        if let Some(providers) = self.providers.upgrade() {
            if let Ok(mut providers) = providers.lock() {
                providers.remove(&self.view_type);
                debug!("Unregistered custom editor {}", self.view_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        view_type: &'static str,
        pattern: &'static str,
    }

    impl CustomEditorProvider for Fixed {
        fn view_type(&self) -> &str {
            self.view_type
        }

        fn file_name_pattern(&self) -> &str {
            self.pattern
        }
    }

    #[test]
    fn test_register_resolve_and_dispose() {
        let registry = CustomEditorRegistry::default();
        let mut registration = registry
            .register(Arc::new(Fixed {
                view_type: "beef.test",
                pattern: "BeefProj.toml",
            }))
            .unwrap();

        assert_eq!(
            registry.resolve(Path::new("/work/app/BeefProj.toml")),
            Some("beef.test".to_string())
        );
        assert_eq!(registry.resolve(Path::new("/work/app/Other.toml")), None);

        registration.dispose();
        registration.dispose();
        assert!(!registry.is_registered("beef.test"));
        assert_eq!(registry.resolve(Path::new("/work/app/BeefProj.toml")), None);
    }

    #[test]
    fn test_wildcard_pattern() {
        let registry = CustomEditorRegistry::default();
        let _registration = registry
            .register(Arc::new(Fixed {
                view_type: "beef.sources",
                pattern: "*.bf",
            }))
            .unwrap();

        assert!(registry.resolve(Path::new("src/Program.bf")).is_some());
        assert!(registry.resolve(Path::new("src/Program.bfx")).is_none());
    }

    #[test]
    fn test_duplicate_and_invalid_view_types_rejected() {
        let registry = CustomEditorRegistry::default();
        let _first = registry
            .register(Arc::new(Fixed {
                view_type: "beef.dup",
                pattern: "a",
            }))
            .unwrap();

        assert!(matches!(
            registry.register(Arc::new(Fixed {
                view_type: "beef.dup",
                pattern: "b",
            })),
            Err(RegistrationError::DuplicateViewType(_))
        ));
        assert!(matches!(
            registry.register(Arc::new(Fixed {
                view_type: "has space",
                pattern: "c",
            })),
            Err(RegistrationError::InvalidViewType(_))
        ));
    }
}
