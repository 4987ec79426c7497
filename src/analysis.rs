//! Scan verdict model shared with the remote scanning service.

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Safety verdict the scanning service assigns to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SafetyRating {
    /// No meaningful risk signals found.
    Safe,
    /// Some risk signals; proceed carefully.
    Caution,
    /// Strong scam indicators.
    Unsafe,
    /// Analysis still in progress on the server side.
    Pending,
    /// Catch-all for rating strings this client does not recognize.
    Unknown,
}

impl SafetyRating {
    /// Lowercase wire/CSS token for the rating.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Caution => "caution",
            Self::Unsafe => "unsafe",
            Self::Pending => "pending",
            Self::Unknown => "unknown",
        }
    }
}

impl Serialize for SafetyRating {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SafetyRating {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // The server may introduce ratings this client predates; those fold
        // into the catch-all instead of failing the whole scan response.
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "safe" => Self::Safe,
            "caution" => Self::Caution,
            "unsafe" => Self::Unsafe,
            "pending" => Self::Pending,
            _ => Self::Unknown,
        })
    }
}

/// Risk assessment for one listing, as returned by the scanning service.
///
/// Treated as opaque and trusted by this layer; the fields below are the
/// only parts of the server schema this client reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Overall verdict.
    pub safety_rating: SafetyRating,
    /// Confidence in the verdict, 0-100.
    #[serde(default)]
    pub confidence_score: u8,
    /// Human-readable risk signals, most significant first.
    #[serde(default)]
    pub risk_factors: Vec<String>,
}

impl ScanResult {
    /// Builds a result with no risk factors.
    pub fn new(safety_rating: SafetyRating, confidence_score: u8) -> Self {
        Self {
            safety_rating,
            confidence_score,
            risk_factors: Vec::new(),
        }
    }

    /// Attaches risk factors.
    pub fn with_risk_factors<I, S>(mut self, factors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.risk_factors = factors.into_iter().map(Into::into).collect();
        self
    }
}
