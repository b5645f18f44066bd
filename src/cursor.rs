//! Cursor theme context handed to output consumers.

use std::path::PathBuf;

use tracing::{debug, warn};
use xcursor::CursorTheme;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorContext {
    theme: String,
    size: u32,
    default_icon: Option<PathBuf>,
}

impl CursorContext {
    /// Resolves the theme's default pointer icon through the xcursor search path.
    pub fn load(theme: &str, size: u32) -> Self {
        let default_icon = CursorTheme::load(theme).load_icon("default");
        match &default_icon {
            Some(path) => debug!(theme, path = %path.display(), "resolved cursor theme"),
            None => warn!(theme, "cursor theme has no default icon, clients will get the fallback"),
        }
        Self {
            theme: theme.to_owned(),
            size,
            default_icon,
        }
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn default_icon(&self) -> Option<&PathBuf> {
        self.default_icon.as_ref()
    }
}
