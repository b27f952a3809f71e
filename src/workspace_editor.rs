//! Custom editor for Beef workspace files (`BeefSpace.toml`)
//!
//! Only the registration is handled here; the editor surface is
//! rendered by the host.

use std::sync::Arc;

use crate::host::custom_editor::CustomEditorRegistration;
use crate::host::{CustomEditorProvider, ExtensionContext, ExtensionHost, RegistrationError};

pub const WORKSPACE_EDITOR_VIEW_TYPE: &str = "beef.workspaceEditor";

pub const WORKSPACE_FILE_NAME: &str = "BeefSpace.toml";

#[derive(Debug, Default)]
pub struct WorkspaceEditorProvider;

impl WorkspaceEditorProvider {
    /// Register with the host and park the registration in `context`
    pub fn register(
        context: &mut ExtensionContext,
        host: &dyn ExtensionHost,
    ) -> Result<(), RegistrationError> {
        let registration: CustomEditorRegistration = host
            .custom_editors()
            .register(Arc::new(WorkspaceEditorProvider))?;
        context.push_subscription(Box::new(registration));
        Ok(())
    }
}

impl CustomEditorProvider for WorkspaceEditorProvider {
    fn view_type(&self) -> &str {
        WORKSPACE_EDITOR_VIEW_TYPE
    }

    fn file_name_pattern(&self) -> &str {
        WORKSPACE_FILE_NAME
    }
}
