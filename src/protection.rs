//! Page-level protection controller: session lifecycle and sweep
//! orchestration.
//!
//! One [`PageSession`] covers one (virtual) page: it owns the scan tracker
//! and unsafe-click guards for that page and consumes mutation records until
//! the page navigates away. [`run_protection`] is the outer loop that
//! rebuilds the pipeline across in-page navigations, disposing the old
//! session before constructing its replacement so observers never pile up.

use crate::analysis::{SafetyRating, ScanResult};
use crate::badge::BadgeRenderer;
use crate::classifier::ListingUrl;
use crate::dom::PageDom;
use crate::guard::{ClickEvent, ClickGuard, ClickHandler, WarningPrompt};
use crate::locator::{DetectedListing, ListingLocator};
use crate::relay::{RelayError, RelayHandle};
use crate::settings::ProtectionSettings;
use crate::tracker::ScanTracker;
use crate::watcher::{MutationRecord, MutationWatcher, WatcherConfig};
use futures_util::future::join_all;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use url::Url;

/// Lifecycle of a page session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed but not yet initializing.
    Uninitialized,
    /// Loading settings and running the initial sweep.
    Initializing,
    /// Observing mutations and scanning.
    Active,
}

/// Why a session's run loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// The page URL changed; the pipeline must be rebuilt.
    Navigated {
        /// URL the page moved to.
        url: Url,
    },
    /// The mutation channel closed; the page is gone.
    Disconnected,
}

/// Protection pipeline for a single page.
pub struct PageSession {
    state: SessionState,
    url: Url,
    settings: ProtectionSettings,
    dom: Rc<RefCell<PageDom>>,
    locator: ListingLocator,
    watcher: MutationWatcher,
    renderer: BadgeRenderer,
    tracker: ScanTracker,
    guards: HashMap<ListingUrl, ClickGuard>,
    click_handlers: HashMap<ListingUrl, ClickHandler>,
    relay: RelayHandle,
    config: WatcherConfig,
}

impl PageSession {
    /// Builds and initializes a session over the page's current document:
    /// loads the settings snapshot through the relay, injects branding, and
    /// runs the initial sweep (when auto-scan is enabled).
    pub async fn initialize(
        dom: Rc<RefCell<PageDom>>,
        relay: RelayHandle,
        config: WatcherConfig,
    ) -> Result<Self, RelayError> {
        let url = dom.borrow().url().clone();
        let mut session = Self {
            state: SessionState::Uninitialized,
            url,
            settings: ProtectionSettings::default(),
            dom,
            locator: ListingLocator::new(),
            watcher: MutationWatcher::new(),
            renderer: BadgeRenderer::new(),
            tracker: ScanTracker::new(),
            guards: HashMap::new(),
            click_handlers: HashMap::new(),
            relay,
            config,
        };

        session.state = SessionState::Initializing;
        session.settings = session.relay.get_settings().await?;
        session
            .renderer
            .inject_branding(&mut session.dom.borrow_mut());
        if session.settings.enable_auto_scan {
            session.sweep().await;
        }
        session.state = SessionState::Active;
        tracing::info!(url = %session.url, "marketplace protection active");
        Ok(session)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// URL this session was built for.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Settings snapshot loaded at initialization.
    pub fn settings(&self) -> ProtectionSettings {
        self.settings
    }

    /// Scan states accumulated so far.
    pub fn tracker(&self) -> &ScanTracker {
        &self.tracker
    }

    /// Consumes the session, releasing its tracker for reporting.
    pub fn into_tracker(self) -> ScanTracker {
        self.tracker
    }

    /// Consumes mutation records until the page navigates or the channel
    /// closes.
    ///
    /// Every record doubles as a URL poll: in-page navigations do not fire
    /// events of their own, so the current page URL is compared on each
    /// tick. Qualifying records arm (or re-arm) a trailing debounce; its
    /// expiry triggers one full-document sweep.
    pub async fn run(&mut self, events: &mut UnboundedReceiver<MutationRecord>) -> SessionExit {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                maybe_record = events.recv() => {
                    let Some(record) = maybe_record else {
                        return SessionExit::Disconnected;
                    };
                    let current = self.dom.borrow().url().clone();
                    if current != self.url {
                        return SessionExit::Navigated { url: current };
                    }
                    let qualifying = self.settings.enable_auto_scan && {
                        let dom = self.dom.borrow();
                        self.watcher.qualifies(&dom, &record)
                    };
                    if qualifying {
                        deadline = Some(Instant::now() + self.config.debounce);
                    }
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    deadline = None;
                    self.sweep().await;
                }
            }
        }
    }

    /// Tears the session down. Pending debounce state and guards die with
    /// it; callers construct the replacement session only after this.
    pub fn dispose(self) {
        tracing::debug!(url = %self.url, "page session disposed");
    }

    /// One detection sweep: locate, filter through the tracker, scan, and
    /// apply results.
    ///
    /// Scans are issued in detection order and awaited together; a failure
    /// marks its own listing failed and never disturbs the rest of the
    /// batch.
    pub async fn sweep(&mut self) {
        let detected = {
            let dom = self.dom.borrow();
            self.locator.find_listings(&dom)
        };
        let pending: Vec<DetectedListing> = detected
            .into_iter()
            .filter(|listing| self.tracker.should_queue(&listing.url))
            .collect();
        if pending.is_empty() {
            return;
        }

        for listing in &pending {
            self.tracker.mark_queued(listing.url.clone());
        }
        tracing::debug!(count = pending.len(), "scanning newly detected listings");

        let scans = pending.iter().map(|listing| {
            let relay = self.relay.clone();
            let url = listing.url.clone();
            async move { relay.scan_listing(&url).await }
        });
        let outcomes = join_all(scans).await;

        for (listing, outcome) in pending.iter().zip(outcomes) {
            match outcome {
                Ok(result) => self.apply_result(listing, result),
                Err(err) => {
                    tracing::warn!(url = %listing.url, error = %err, "listing scan failed");
                    self.tracker.mark_failed(listing.url.clone(), err.to_string());
                }
            }
        }
    }

    fn apply_result(&mut self, listing: &DetectedListing, result: ScanResult) {
        if self.settings.show_safety_badges {
            let mut dom = self.dom.borrow_mut();
            self.renderer.render_badge(&mut dom, listing.node, &result);
        }
        if result.safety_rating == SafetyRating::Unsafe {
            {
                let mut dom = self.dom.borrow_mut();
                self.renderer.mark_unsafe(&mut dom, listing.node);
            }
            let prior = self.click_handlers.remove(&listing.url);
            self.guards.insert(
                listing.url.clone(),
                ClickGuard::new(&result.risk_factors, prior),
            );
        }
        self.tracker.mark_completed(listing.url.clone(), result);
    }

    /// Registers the host's click behavior for a listing. When the listing
    /// is later rated unsafe, its confirmation gate wraps this handler; the
    /// gate's proceed path then delegates to it.
    pub fn set_click_handler(&mut self, url: ListingUrl, handler: ClickHandler) {
        self.click_handlers.insert(url, handler);
    }

    /// Routes a click on `url` through its guard, when one is installed.
    /// Returns false when the listing has no guard (not rated unsafe).
    pub fn dispatch_click(
        &mut self,
        url: &ListingUrl,
        prompt: &mut dyn WarningPrompt,
        event: &mut ClickEvent,
    ) -> bool {
        match self.guards.get_mut(url) {
            Some(guard) => {
                guard.handle(prompt, event);
                true
            }
            None => false,
        }
    }

    /// The guard installed for `url`, when it was rated unsafe.
    pub fn guard(&self, url: &ListingUrl) -> Option<&ClickGuard> {
        self.guards.get(url)
    }
}

/// Runs protection across in-page navigations until the mutation channel
/// closes, returning the final session's tracker for reporting.
///
/// On navigation the old session is disposed first, the settle delay
/// elapses, and only then is the replacement session built — with a fresh
/// tracker, so listings from the previous virtual page are forgotten.
pub async fn run_protection(
    dom: Rc<RefCell<PageDom>>,
    relay: RelayHandle,
    config: WatcherConfig,
    mut events: UnboundedReceiver<MutationRecord>,
) -> Result<ScanTracker, RelayError> {
    let mut session = PageSession::initialize(Rc::clone(&dom), relay.clone(), config).await?;
    loop {
        match session.run(&mut events).await {
            SessionExit::Disconnected => return Ok(session.into_tracker()),
            SessionExit::Navigated { url } => {
                tracing::info!(%url, "page navigation detected, rebuilding pipeline");
                session.dispose();
                tokio::time::sleep(config.settle).await;
                session =
                    PageSession::initialize(Rc::clone(&dom), relay.clone(), config).await?;
            }
        }
    }
}
