#![warn(missing_docs)]
//! Core library entry points for the MarketShield page-protection engine.

pub mod analysis;
pub mod api;
pub mod badge;
pub mod classifier;
pub mod dom;
pub mod guard;
pub mod history;
pub mod locator;
pub mod protection;
pub mod relay;
pub mod settings;
pub mod tracker;
pub mod watcher;

pub use analysis::{SafetyRating, ScanResult};
pub use api::{ApiError, AuthStatus, ScanBackend, ShieldApi, UserProfile};
pub use badge::BadgeRenderer;
pub use classifier::{
    is_listing_url, is_supported_marketplace, normalize_listing_url, ListingUrl,
};
pub use dom::PageDom;
pub use guard::{ClickEvent, ClickGuard, ClickHandler, WarningPrompt};
pub use history::{HistoryStore, ScanRecord, HISTORY_CAPACITY};
pub use locator::{DetectedListing, ListingLocator};
pub use protection::{run_protection, PageSession, SessionExit, SessionState};
pub use relay::{relay_channel, BackgroundRelay, RelayError, RelayHandle, RelayRequest};
pub use settings::ProtectionSettings;
pub use tracker::{ScanState, ScanTracker, TrackerSummary};
pub use watcher::{MutationRecord, MutationWatcher, WatcherConfig};
