//! Per-session protection settings.

use serde::{Deserialize, Serialize};

/// Settings snapshot a page session loads once at initialization.
///
/// Changes made while a session is active are picked up only by the next
/// session; nothing here is observed live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtectionSettings {
    /// Scan newly detected listings automatically.
    pub enable_auto_scan: bool,
    /// Inject safety badges and title flags into the page.
    pub show_safety_badges: bool,
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            enable_auto_scan: true,
            show_safety_badges: true,
        }
    }
}
