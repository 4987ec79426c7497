//! End-to-end pipeline scenarios: detection through relay to badges.

use async_trait::async_trait;
use marketshield::{
    normalize_listing_url, relay_channel, ApiError, BackgroundRelay, ClickEvent, ListingUrl,
    PageDom, PageSession, ProtectionSettings, RelayError, RelayRequest, SafetyRating,
    ScanBackend, ScanResult, ScanState, SessionState, UserProfile, WarningPrompt, WatcherConfig,
};
use scraper::Selector;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use url::Url;

const MARKETPLACE_PAGE: &str = r#"<html><body>
    <div role="article" data-pagelet="card-safe">
        <img src="bike.jpg">
        <h3><a href="/marketplace/item/100?ref=feed">Road bike, tuned up</a></h3>
    </div>
    <div role="article" data-pagelet="card-unsafe">
        <img src="phone.jpg">
        <h3><a href="/marketplace/item/200?ref=feed">Brand new phone, sealed</a></h3>
    </div>
    <div role="article" data-pagelet="card-failing">
        <h3><a href="/marketplace/item/300">Mystery box</a></h3>
    </div>
    <div role="article" data-pagelet="card-dup">
        <h3><a href="/marketplace/item/100?ref=search">Road bike, tuned up (again)</a></h3>
    </div>
</body></html>"#;

fn base_url() -> Url {
    Url::parse("https://www.facebook.com/marketplace/boston").expect("base url")
}

fn listing(id: u32) -> ListingUrl {
    normalize_listing_url(
        &format!("https://www.facebook.com/marketplace/item/{id}"),
        &base_url(),
    )
    .expect("listing url")
}

fn shared_page(html: &str) -> Rc<RefCell<PageDom>> {
    Rc::new(RefCell::new(PageDom::parse(html, base_url())))
}

/// Relay double answering scans from a per-URL script.
fn scripted_relay(
    verdicts: HashMap<ListingUrl, Result<ScanResult, RelayError>>,
) -> marketshield::RelayHandle {
    let (handle, mut rx) = relay_channel();
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            match request {
                RelayRequest::GetSettings { respond_to } => {
                    let _ = respond_to.send(ProtectionSettings::default());
                }
                RelayRequest::ScanListing { url, respond_to } => {
                    let outcome = verdicts.get(&url).cloned().unwrap_or_else(|| {
                        Err(RelayError::Remote(format!("unexpected scan for {url}")))
                    });
                    let _ = respond_to.send(outcome);
                }
                _ => {}
            }
        }
    });
    handle
}

struct Scripted(bool);

impl WarningPrompt for Scripted {
    fn confirm(&mut self, _message: &str) -> bool {
        self.0
    }
}

fn count(dom: &PageDom, selector: &str) -> usize {
    let sel = Selector::parse(selector).expect("selector");
    dom.document().select(&sel).count()
}

#[tokio::test(flavor = "current_thread")]
async fn mixed_batch_badges_guards_and_failures() {
    let mut verdicts = HashMap::new();
    verdicts.insert(listing(100), Ok(ScanResult::new(SafetyRating::Safe, 94)));
    verdicts.insert(
        listing(200),
        Ok(ScanResult::new(SafetyRating::Unsafe, 87)
            .with_risk_factors(["stock photos", "price far below market"])),
    );
    verdicts.insert(
        listing(300),
        Err(RelayError::NotAuthenticated {
            message: "Please log in".to_string(),
        }),
    );

    let page = shared_page(MARKETPLACE_PAGE);
    let mut session = PageSession::initialize(
        Rc::clone(&page),
        scripted_relay(verdicts),
        WatcherConfig::default(),
    )
    .await
    .expect("initialize");

    assert_eq!(session.state(), SessionState::Active);

    // Duplicate anchors collapse: three scans tracked, not four.
    assert_eq!(session.tracker().len(), 3);
    let summary = session.tracker().summary();
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);

    {
        let dom = page.borrow();
        // One badge per completed listing; the failed one stays bare.
        assert_eq!(count(&dom, ".marketshield-safety-badge"), 2);
        assert_eq!(count(&dom, ".marketshield-unsafe-overlay"), 1);
        assert_eq!(
            count(&dom, "[data-pagelet=\"card-failing\"] .marketshield-safety-badge"),
            0
        );
        // The duplicate card never got its own badge; the first anchor won.
        assert_eq!(
            count(&dom, "[data-pagelet=\"card-safe\"] .marketshield-safety-badge"),
            1
        );
        assert_eq!(
            count(&dom, "[data-pagelet=\"card-dup\"] .marketshield-safety-badge"),
            0
        );
        assert_eq!(count(&dom, "#marketshield-branding"), 1);
    }

    assert!(matches!(
        session.tracker().state(&listing(300)),
        Some(ScanState::Failed(reason)) if reason == "Please log in"
    ));

    // Unsafe listing: cancel suppresses the click, proceed lets it through.
    let mut cancelled = ClickEvent::new();
    assert!(session.dispatch_click(&listing(200), &mut Scripted(false), &mut cancelled));
    assert!(cancelled.default_prevented());
    assert!(cancelled.propagation_stopped());

    let mut proceeded = ClickEvent::new();
    assert!(session.dispatch_click(&listing(200), &mut Scripted(true), &mut proceeded));
    assert!(!proceeded.default_prevented());

    let guard = session.guard(&listing(200)).expect("guard installed");
    assert!(guard.message().contains("stock photos, price far below market"));

    // Safe listings carry no guard.
    let mut safe_click = ClickEvent::new();
    assert!(!session.dispatch_click(&listing(100), &mut Scripted(false), &mut safe_click));
    assert!(!safe_click.default_prevented());
}

#[tokio::test(flavor = "current_thread")]
async fn guard_wraps_click_handler_registered_before_verdict() {
    let mut verdicts = HashMap::new();
    verdicts.insert(
        listing(400),
        Ok(ScanResult::new(SafetyRating::Unsafe, 91).with_risk_factors(["cloned listing"])),
    );

    let page = shared_page("<html><body></body></html>");
    let mut session = PageSession::initialize(
        Rc::clone(&page),
        scripted_relay(verdicts),
        WatcherConfig::default(),
    )
    .await
    .expect("initialize");

    // The host wires its click behavior while the listing is still unscanned.
    let clicked = Rc::new(std::cell::Cell::new(false));
    let seen = Rc::clone(&clicked);
    session.set_click_handler(
        listing(400),
        Box::new(move |_event| seen.set(true)),
    );

    page.borrow_mut().append_body_fragment(
        r#"<div role="article"><h3><a href="/marketplace/item/400">Too good to be true</a></h3></div>"#,
    );
    session.sweep().await;

    let mut cancelled = ClickEvent::new();
    assert!(session.dispatch_click(&listing(400), &mut Scripted(false), &mut cancelled));
    assert!(cancelled.default_prevented());
    assert!(!clicked.get());

    let mut proceeded = ClickEvent::new();
    assert!(session.dispatch_click(&listing(400), &mut Scripted(true), &mut proceeded));
    assert!(clicked.get());
    assert!(!proceeded.default_prevented());
}

struct ScriptedBackend {
    authenticated: bool,
}

#[async_trait]
impl ScanBackend for ScriptedBackend {
    async fn auth_status(&self) -> Result<Option<UserProfile>, ApiError> {
        Ok(self.authenticated.then(|| UserProfile {
            email: "buyer@example.com".to_string(),
            subscription_tier: "pro".to_string(),
        }))
    }

    async fn scan_listing(&self, url: &ListingUrl) -> Result<ScanResult, ApiError> {
        let rating = if url.as_str().ends_with("/200") {
            SafetyRating::Caution
        } else {
            SafetyRating::Safe
        };
        Ok(ScanResult::new(rating, 80))
    }
}

#[tokio::test(flavor = "current_thread")]
async fn background_relay_records_session_scans_in_history() {
    let (handle, serve) =
        BackgroundRelay::new(ScriptedBackend { authenticated: true }, ProtectionSettings::default())
            .spawn();

    let page = shared_page(MARKETPLACE_PAGE);
    let session = PageSession::initialize(Rc::clone(&page), handle.clone(), WatcherConfig::default())
        .await
        .expect("initialize");

    assert_eq!(session.tracker().summary().completed, 3);

    let history = handle.get_scan_history().await.expect("history");
    assert_eq!(history.len(), 3);
    let mut urls: Vec<&str> = history.iter().map(|record| record.url.as_str()).collect();
    urls.sort_unstable();
    assert_eq!(
        urls,
        vec![
            "https://www.facebook.com/marketplace/item/100",
            "https://www.facebook.com/marketplace/item/200",
            "https://www.facebook.com/marketplace/item/300",
        ]
    );

    let status = handle.get_user_status().await.expect("status");
    assert!(status.authenticated);
    assert_eq!(
        status.user.expect("profile").subscription_tier,
        "pro"
    );

    drop(session);
    drop(handle);
    let final_history = serve.await.expect("serve loop");
    assert_eq!(final_history.len(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn unauthenticated_backend_fails_every_listing_quietly() {
    let (handle, _serve) = BackgroundRelay::new(
        ScriptedBackend {
            authenticated: false,
        },
        ProtectionSettings::default(),
    )
    .spawn();

    let page = shared_page(MARKETPLACE_PAGE);
    let session = PageSession::initialize(Rc::clone(&page), handle.clone(), WatcherConfig::default())
        .await
        .expect("initialize");

    let summary = session.tracker().summary();
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.completed, 0);
    assert_eq!(count(&page.borrow(), ".marketshield-safety-badge"), 0);

    assert!(handle
        .get_scan_history()
        .await
        .expect("history")
        .is_empty());
}
