//! Message contract between page sessions and the privileged background
//! relay, plus the relay serve loop itself.
//!
//! The relay is the only component that talks to the scanning service or
//! touches persistent state (scan history, settings). Page sessions hold a
//! [`RelayHandle`] and exchange typed request/response pairs over an
//! in-process channel; a closed channel is indistinguishable from a torn-
//! down extension context and surfaces as [`RelayError::Unavailable`].

use crate::analysis::ScanResult;
use crate::api::{ApiError, AuthStatus, ScanBackend};
use crate::classifier::ListingUrl;
use crate::history::{epoch_ms_now, HistoryStore, ScanRecord};
use crate::settings::ProtectionSettings;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Message the relay reports when a scan requires a logged-in session.
const LOGIN_REQUIRED: &str = "Please log in to MarketShield to scan listings";
/// Guidance when the scanning service could not be reached at all.
const SERVICE_UNREACHABLE: &str = "Please open MarketShield in your browser and log in first";

/// Failures a relay request can surface to the page session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The relay channel is gone (extension context invalidated).
    #[error("background relay unavailable: {0}")]
    Unavailable(String),
    /// The scanning service requires a logged-in session.
    #[error("{message}")]
    NotAuthenticated {
        /// Human-readable guidance for the user.
        message: String,
    },
    /// The scanning service reported an application error.
    #[error("{0}")]
    Remote(String),
}

impl RelayError {
    /// True for failures the popup should resolve by prompting a login.
    pub fn needs_auth(&self) -> bool {
        matches!(self, Self::NotAuthenticated { .. })
    }
}

/// Requests the background relay serves.
#[derive(Debug)]
pub enum RelayRequest {
    /// Scan one listing; single attempt, no retry.
    ScanListing {
        /// Listing to scan.
        url: ListingUrl,
        /// Responder for the verdict or failure.
        respond_to: oneshot::Sender<Result<ScanResult, RelayError>>,
    },
    /// Report the user's authentication state.
    GetUserStatus {
        /// Responder for the status.
        respond_to: oneshot::Sender<AuthStatus>,
    },
    /// Return the scan history, most recent first.
    GetScanHistory {
        /// Responder for the records.
        respond_to: oneshot::Sender<Vec<ScanRecord>>,
    },
    /// Append a record to history. Fire-and-forget.
    SaveScanResult {
        /// Record to append.
        record: ScanRecord,
    },
    /// Return the current settings snapshot.
    GetSettings {
        /// Responder for the snapshot.
        respond_to: oneshot::Sender<ProtectionSettings>,
    },
}

/// Page-session side of the relay channel.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<RelayRequest>,
}

/// Creates a relay channel: the handle for sessions and the receiver a
/// serve loop (real or scripted) drains.
pub fn relay_channel() -> (RelayHandle, mpsc::UnboundedReceiver<RelayRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RelayHandle { tx }, rx)
}

impl RelayHandle {
    fn request<T>(
        &self,
        request: RelayRequest,
        rx: oneshot::Receiver<T>,
    ) -> Result<impl std::future::Future<Output = Result<T, RelayError>>, RelayError> {
        self.tx
            .send(request)
            .map_err(|_| RelayError::Unavailable("extension context invalidated".to_string()))?;
        Ok(async move {
            rx.await.map_err(|_| {
                RelayError::Unavailable("background relay dropped the request".to_string())
            })
        })
    }

    /// Requests a scan for `url` and awaits the verdict.
    pub async fn scan_listing(&self, url: &ListingUrl) -> Result<ScanResult, RelayError> {
        let (tx, rx) = oneshot::channel();
        let pending = self.request(
            RelayRequest::ScanListing {
                url: url.clone(),
                respond_to: tx,
            },
            rx,
        )?;
        pending.await?
    }

    /// Fetches the user's authentication state.
    pub async fn get_user_status(&self) -> Result<AuthStatus, RelayError> {
        let (tx, rx) = oneshot::channel();
        let pending = self.request(RelayRequest::GetUserStatus { respond_to: tx }, rx)?;
        pending.await
    }

    /// Fetches the scan history, most recent first.
    pub async fn get_scan_history(&self) -> Result<Vec<ScanRecord>, RelayError> {
        let (tx, rx) = oneshot::channel();
        let pending = self.request(RelayRequest::GetScanHistory { respond_to: tx }, rx)?;
        pending.await
    }

    /// Fetches the settings snapshot.
    pub async fn get_settings(&self) -> Result<ProtectionSettings, RelayError> {
        let (tx, rx) = oneshot::channel();
        let pending = self.request(RelayRequest::GetSettings { respond_to: tx }, rx)?;
        pending.await
    }

    /// Appends a record to history. Best effort; a closed channel is logged
    /// and otherwise ignored.
    pub fn save_scan_result(&self, record: ScanRecord) {
        if self
            .tx
            .send(RelayRequest::SaveScanResult { record })
            .is_err()
        {
            tracing::debug!("dropping scan record, background relay gone");
        }
    }
}

/// The privileged serve loop: owns the scanning-service client, the scan
/// history, and the settings snapshot.
pub struct BackgroundRelay<B: ScanBackend> {
    backend: B,
    history: HistoryStore,
    settings: ProtectionSettings,
}

impl<B: ScanBackend + 'static> BackgroundRelay<B> {
    /// Creates a relay with empty history.
    pub fn new(backend: B, settings: ProtectionSettings) -> Self {
        Self {
            backend,
            history: HistoryStore::new(),
            settings,
        }
    }

    /// Seeds the relay with previously persisted history.
    pub fn with_history(mut self, history: HistoryStore) -> Self {
        self.history = history;
        self
    }

    /// Spawns the serve loop, returning the session-facing handle and a
    /// join handle resolving to the final history once every
    /// [`RelayHandle`] is dropped.
    pub fn spawn(self) -> (RelayHandle, tokio::task::JoinHandle<HistoryStore>) {
        let (handle, rx) = relay_channel();
        let join = tokio::spawn(self.serve(rx));
        (handle, join)
    }

    /// Drains requests until the channel closes, then returns the history.
    pub async fn serve(mut self, mut rx: mpsc::UnboundedReceiver<RelayRequest>) -> HistoryStore {
        while let Some(request) = rx.recv().await {
            self.handle(request).await;
        }
        self.history
    }

    async fn handle(&mut self, request: RelayRequest) {
        match request {
            RelayRequest::ScanListing { url, respond_to } => {
                let outcome = self.scan(&url).await;
                let _ = respond_to.send(outcome);
            }
            RelayRequest::GetUserStatus { respond_to } => {
                let _ = respond_to.send(self.user_status().await);
            }
            RelayRequest::GetScanHistory { respond_to } => {
                let _ = respond_to.send(self.history.snapshot());
            }
            RelayRequest::SaveScanResult { record } => {
                self.history.push(record);
            }
            RelayRequest::GetSettings { respond_to } => {
                let _ = respond_to.send(self.settings);
            }
        }
    }

    async fn scan(&mut self, url: &ListingUrl) -> Result<ScanResult, RelayError> {
        // The session gate comes first so an expired login maps to a clear
        // needs-auth failure instead of an opaque scan rejection.
        match self.backend.auth_status().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(RelayError::NotAuthenticated {
                    message: LOGIN_REQUIRED.to_string(),
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "auth status check failed");
                return Err(RelayError::Remote(SERVICE_UNREACHABLE.to_string()));
            }
        }

        match self.backend.scan_listing(url).await {
            Ok(result) => {
                self.history.push(ScanRecord {
                    url: url.clone(),
                    result: result.clone(),
                    timestamp_epoch_ms: epoch_ms_now(),
                });
                Ok(result)
            }
            Err(ApiError::NotAuthenticated) => Err(RelayError::NotAuthenticated {
                message: LOGIN_REQUIRED.to_string(),
            }),
            Err(err) => {
                tracing::warn!(%url, error = %err, "scan request failed");
                Err(RelayError::Remote(err.to_string()))
            }
        }
    }

    async fn user_status(&self) -> AuthStatus {
        match self.backend.auth_status().await {
            Ok(Some(user)) => AuthStatus {
                authenticated: true,
                user: Some(user),
                error: None,
            },
            Ok(None) => AuthStatus {
                authenticated: false,
                user: None,
                error: None,
            },
            Err(err) => {
                tracing::warn!(error = %err, "auth status check failed");
                AuthStatus {
                    authenticated: false,
                    user: None,
                    error: Some(SERVICE_UNREACHABLE.to_string()),
                }
            }
        }
    }
}
