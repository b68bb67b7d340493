//! Canonical data model for the attribution pipeline.
//!
//! `CanonicalEvent` is produced by the upstream feed step and immutable
//! from there on. `Session` and `AttributedPurchase` are recomputed
//! wholesale on every run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recognized event taxonomy. Anything else is flagged but retained.
pub const RECOGNIZED_EVENTS: &[&str] = &[
    "page_viewed",
    "email_filled_on_popup",
    "product_added_to_cart",
    "checkout_started",
    "purchase",
];

pub const PURCHASE_EVENT: &str = "purchase";

/// Fallback channel label when no attributable touch exists.
pub const DIRECT_CHANNEL: &str = "direct";

/// Per-record quality flags, populated by the feed collaborator.
///
/// Defects are values, not errors: a flagged record stays in the table
/// and the flags aggregate into the integrity rates the monitor checks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QualityFlags {
    #[serde(default)]
    pub json_parse_failed: bool,
    #[serde(default)]
    pub timestamp_unparseable: bool,
    #[serde(default)]
    pub identity_missing: bool,
    #[serde(default)]
    pub event_name_unrecognized: bool,
}

/// One observed action from the clickstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Provenance, part of the duplicate key.
    pub source_file: String,
    /// Stable per-user/browser key; absent for anonymous or blocked traffic.
    pub identity: Option<String>,
    /// Pre-parse timestamp string, part of the duplicate key.
    pub raw_timestamp: Option<String>,
    /// Parsed UTC instant; `None` when the raw string was unparseable.
    pub timestamp: Option<DateTime<Utc>>,
    pub event_name: String,
    /// Pre-parse payload string, part of the duplicate key.
    pub raw_payload: Option<String>,
    /// Parsed payload; absent when the raw payload was missing or failed
    /// to parse. `serde_json::Value` is the tagged string/number/bool/
    /// null/map/list representation; see the `payload` module for field
    /// extraction.
    pub payload: Option<serde_json::Value>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    /// UTM fields extracted from the page URL query string upstream.
    /// A non-null `utm_source` is what makes an event a marketing touch.
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    /// Payload-level price field (first of price/total/revenue/amount/value).
    pub price: Option<f64>,
    pub unit_price: Option<f64>,
    pub quantity: Option<f64>,
    /// Derived `unit_price * quantity` when both present, else the
    /// explicit payload total.
    pub total: Option<f64>,
    pub product_id: Option<String>,
    #[serde(default)]
    pub flags: QualityFlags,
}

impl CanonicalEvent {
    pub fn is_purchase(&self) -> bool {
        self.event_name == PURCHASE_EVENT
    }

    /// An event is a marketing touch iff `utm_source` is non-null.
    /// UTM medium/campaign alone never qualify.
    pub fn is_touch(&self) -> bool {
        self.utm_source.is_some()
    }

    pub fn is_recognized_event(&self) -> bool {
        RECOGNIZED_EVENTS.contains(&self.event_name.as_str())
    }

    /// Purchase revenue: `coalesce(price, total, 0)`, clamped at zero.
    /// A purchase that resolves to zero is a data-quality defect and is
    /// counted, never excluded.
    pub fn revenue(&self) -> f64 {
        self.price.or(self.total).unwrap_or(0.0).max(0.0)
    }
}

/// A run of one identity's events with no inactivity gap exceeding the
/// configured threshold. Members reference the deduplicated event table
/// by index, in timestamp order (stable on ties).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    /// 1-based, unique per identity, assigned in chronological order.
    pub sequence: u64,
    /// Deterministic `{identity}_session_{sequence}`.
    pub session_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Indices into the deduplicated event table.
    pub members: Vec<usize>,
    /// Most recent non-null `utm_source` among members; the session's
    /// own channel for conversion-rate grouping.
    pub last_touch_channel: Option<String>,
}

impl Session {
    pub fn session_id_for(identity: &str, sequence: u64) -> String {
        format!("{}_session_{}", identity, sequence)
    }

    /// Whether the given instant falls inside `[start, end]`.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Multi-touch classification of a purchase, derived from its first and
/// last touch sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionType {
    /// No attributable touch in the lookback window.
    PureDirect,
    /// First and last touch share one source.
    SingleChannel,
    /// First and last touch differ.
    Assisted,
}

impl ConversionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionType::PureDirect => "pure_direct",
            ConversionType::SingleChannel => "single_channel",
            ConversionType::Assisted => "assisted",
        }
    }

    pub fn classify(first: Option<&str>, last: Option<&str>) -> Self {
        match (first, last) {
            (None, _) => ConversionType::PureDirect,
            (Some(f), Some(l)) if f == l => ConversionType::SingleChannel,
            _ => ConversionType::Assisted,
        }
    }
}

/// One purchase event enriched with first/last touch labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributedPurchase {
    /// Index of the purchase in the deduplicated event table.
    pub event_index: usize,
    pub identity: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// `coalesce(price, total, 0)`, never negative.
    pub revenue: f64,
    pub first_touch_channel: Option<String>,
    pub first_touch_medium: Option<String>,
    pub first_touch_campaign: Option<String>,
    pub last_touch_channel: Option<String>,
    pub last_touch_medium: Option<String>,
    pub last_touch_campaign: Option<String>,
    pub conversion_type: ConversionType,
}

impl AttributedPurchase {
    /// Channel label for last-click rollups, null coalesced to "direct".
    pub fn last_channel(&self) -> &str {
        self.last_touch_channel.as_deref().unwrap_or(DIRECT_CHANNEL)
    }

    /// Channel label for first-click rollups, null coalesced to "direct".
    pub fn first_channel(&self) -> &str {
        self.first_touch_channel
            .as_deref()
            .unwrap_or(DIRECT_CHANNEL)
    }
}
