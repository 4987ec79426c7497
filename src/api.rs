//! HTTP client for the MarketShield scanning service.

use crate::analysis::ScanResult;
use crate::classifier::ListingUrl;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const USER_AGENT: &str = "marketshield-extension/0.1 (+https://marketshield.app)";

/// Errors surfaced by the scanning service client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service base URL could not be combined with an endpoint path.
    #[error("invalid scan service base url: {0}")]
    BadBase(#[from] url::ParseError),
    /// The request never produced a usable response.
    #[error("scan service request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The service rejected the request for lack of a session.
    #[error("not authenticated with the scan service")]
    NotAuthenticated,
    /// The service answered with a non-success status.
    #[error("scan service returned HTTP {status}")]
    Status {
        /// The HTTP status code received.
        status: u16,
    },
}

/// Authenticated user profile, as reported by the auth-status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Account email.
    pub email: String,
    /// Subscription tier, defaulting to the free plan when omitted.
    #[serde(default = "default_tier")]
    pub subscription_tier: String,
}

fn default_tier() -> String {
    "free".to_string()
}

/// Relay-level view of the user's authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    /// Whether a logged-in session exists.
    pub authenticated: bool,
    /// Profile details when authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    /// Guidance when the check itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct ScanRequest<'a> {
    url: &'a ListingUrl,
    source: &'static str,
}

/// The network edge the background relay scans through.
///
/// A trait seam so relay behavior is testable without a live service.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    /// Checks for a logged-in session. `Ok(None)` means the service answered
    /// but no session exists.
    async fn auth_status(&self) -> Result<Option<UserProfile>, ApiError>;

    /// Submits one listing for analysis. Single attempt, no retry.
    async fn scan_listing(&self, url: &ListingUrl) -> Result<ScanResult, ApiError>;
}

/// Reqwest-backed client for the MarketShield API.
pub struct ShieldApi {
    client: reqwest::Client,
    auth_url: Url,
    scan_url: Url,
}

impl ShieldApi {
    /// Builds a client against `base` (e.g. `http://localhost:5000`).
    pub fn new(base: Url) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            auth_url: base.join("/api/auth/status")?,
            scan_url: base.join("/api/scan")?,
            client,
        })
    }
}

#[async_trait]
impl ScanBackend for ShieldApi {
    async fn auth_status(&self) -> Result<Option<UserProfile>, ApiError> {
        let response = self.client.get(self.auth_url.clone()).send().await?;
        let status = response.status();
        if status.as_u16() == 401 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }
        let profile = response.json::<UserProfile>().await?;
        Ok(Some(profile))
    }

    async fn scan_listing(&self, url: &ListingUrl) -> Result<ScanResult, ApiError> {
        let response = self
            .client
            .post(self.scan_url.clone())
            .json(&ScanRequest {
                url,
                source: "chrome_extension",
            })
            .send()
            .await?;
        let status = response.status();
        if status.as_u16() == 401 {
            return Err(ApiError::NotAuthenticated);
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.json::<ScanResult>().await?)
    }
}
