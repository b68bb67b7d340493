//! Channel / device / conversion rollups and the revenue reconciliation
//! gate.
//!
//! Reconciliation is an internal-consistency check, not a data-quality
//! rate: attributed revenue must exactly equal the raw purchase revenue
//! of the deduplicated feed, or the attribution join dropped or invented
//! a purchase and the run's numbers cannot be trusted.

use std::collections::{BTreeMap, HashMap};

use anyhow::{ensure, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::device::{classify_device, DeviceClass};
use crate::models::{
    AttributedPurchase, CanonicalEvent, ConversionType, Session, DIRECT_CHANNEL,
};

/// Revenue and purchase count for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRollup {
    pub channel: String,
    pub purchases: u64,
    pub revenue: f64,
}

/// Conversion rate for one channel: purchases whose containing session
/// carries the channel, over sessions carrying the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRow {
    pub channel: String,
    pub purchases: u64,
    pub sessions: u64,
    /// `None` when the channel has zero sessions (never infinity).
    pub conversion_rate: Option<f64>,
}

/// Purchases, revenue and session volume for one device class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRollup {
    pub device: DeviceClass,
    pub purchases: u64,
    pub revenue: f64,
    pub sessions: u64,
    pub revenue_per_session: Option<f64>,
}

/// Daily purchase volume; the monitor's baseline series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyRevenueRow {
    pub date: NaiveDate,
    pub purchases: u64,
    pub revenue: f64,
    pub avg_order_value: f64,
}

/// Purchases and revenue per multi-touch conversion type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionTypeRollup {
    pub conversion_type: ConversionType,
    pub purchases: u64,
    pub revenue: f64,
}

/// Per-identity activity summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub identity: String,
    pub first_seen: chrono::DateTime<chrono::Utc>,
    pub last_seen: chrono::DateTime<chrono::Utc>,
    pub sessions: u64,
}

/// Quality-flag counts and derived integrity rates over the
/// deduplicated table. The monitor reads these; nothing here aborts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_events: usize,
    pub purchase_count: usize,
    pub duplicates_removed: usize,
    pub null_identity: usize,
    pub unparseable_timestamp: usize,
    pub payload_parse_failures: usize,
    pub unrecognized_event_names: usize,
    pub unresolved_revenue_purchases: usize,
    pub sessionization_skipped: usize,
    pub null_identity_rate: f64,
    pub duplicate_rate: f64,
    pub payload_error_rate: f64,
    /// Most recent event date in the batch, when any timestamp parsed.
    pub latest_event_date: Option<NaiveDate>,
}

/// All rollup tables for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupTables {
    pub channel_last_click: Vec<ChannelRollup>,
    pub channel_first_click: Vec<ChannelRollup>,
    pub conversion_by_channel: Vec<ConversionRow>,
    pub devices: Vec<DeviceRollup>,
    pub daily_revenue: Vec<DailyRevenueRow>,
    pub conversion_types: Vec<ConversionTypeRollup>,
    pub identities: Vec<IdentitySummary>,
    pub quality: QualitySummary,
}

/// Counts fed in from the upstream stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCounts {
    pub duplicates_removed: usize,
    pub sessionization_skipped: usize,
    pub unresolved_revenue_purchases: usize,
}

/// Build every rollup table and run the reconciliation gate.
///
/// Errors only on reconciliation failure; data defects surface as counts
/// in the quality summary.
pub fn build_rollups(
    events: &[CanonicalEvent],
    sessions: &[Session],
    purchases: &[AttributedPurchase],
    counts: StageCounts,
) -> Result<RollupTables> {
    reconcile_revenue(events, purchases)?;

    let tables = RollupTables {
        channel_last_click: channel_rollup(purchases, |p| p.last_channel()),
        channel_first_click: channel_rollup(purchases, |p| p.first_channel()),
        conversion_by_channel: conversion_by_channel(sessions, purchases),
        devices: device_rollup(events, sessions, purchases),
        daily_revenue: daily_revenue(purchases),
        conversion_types: conversion_type_rollup(purchases),
        identities: identity_summaries(events, sessions),
        quality: quality_summary(events, purchases, counts),
    };

    info!(
        channels = tables.channel_last_click.len(),
        days = tables.daily_revenue.len(),
        identities = tables.identities.len(),
        "rollups built"
    );

    Ok(tables)
}

/// Attributed revenue must equal raw purchase revenue, exactly. Both
/// sides apply the same coalesce in the same feed order, so a mismatch
/// means a purchase was dropped or double-counted, never rounding.
fn reconcile_revenue(events: &[CanonicalEvent], purchases: &[AttributedPurchase]) -> Result<()> {
    let raw_purchases = events.iter().filter(|e| e.is_purchase());
    let raw_count = raw_purchases.clone().count();
    let raw_revenue: f64 = raw_purchases.map(|e| e.revenue()).sum();
    let attributed_revenue: f64 = purchases.iter().map(|p| p.revenue).sum();

    ensure!(
        purchases.len() == raw_count,
        "attribution dropped purchases: {} attributed vs {} raw",
        purchases.len(),
        raw_count
    );
    ensure!(
        attributed_revenue == raw_revenue,
        "revenue reconciliation failed: attributed {} vs raw {}",
        attributed_revenue,
        raw_revenue
    );
    Ok(())
}

fn channel_rollup<'a, F>(purchases: &'a [AttributedPurchase], channel_of: F) -> Vec<ChannelRollup>
where
    F: Fn(&'a AttributedPurchase) -> &'a str,
{
    let mut grouped: HashMap<&str, (u64, f64)> = HashMap::new();
    for p in purchases {
        let entry = grouped.entry(channel_of(p)).or_default();
        entry.0 += 1;
        entry.1 += p.revenue;
    }

    let mut rows: Vec<ChannelRollup> = grouped
        .into_iter()
        .map(|(channel, (purchases, revenue))| ChannelRollup {
            channel: channel.to_string(),
            purchases,
            revenue,
        })
        .collect();
    // Revenue descending, channel as tie-break for deterministic output.
    rows.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.channel.cmp(&b.channel))
    });
    rows
}

/// Conversion rate per channel. A session's channel is its own last
/// touch; a purchase counts toward the channel of the session containing
/// it. The output is keyed by the session channel set, so purchases in
/// channels with zero sessions of their own do not appear.
fn conversion_by_channel(
    sessions: &[Session],
    purchases: &[AttributedPurchase],
) -> Vec<ConversionRow> {
    let mut session_counts: HashMap<&str, u64> = HashMap::new();
    for s in sessions {
        let channel = s.last_touch_channel.as_deref().unwrap_or(DIRECT_CHANNEL);
        *session_counts.entry(channel).or_default() += 1;
    }

    let locator = SessionLocator::build(sessions);
    let mut purchase_counts: HashMap<&str, u64> = HashMap::new();
    for p in purchases {
        let channel = locator
            .containing(p)
            .and_then(|s| s.last_touch_channel.as_deref())
            .unwrap_or(DIRECT_CHANNEL);
        *purchase_counts.entry(channel).or_default() += 1;
    }

    let mut rows: Vec<ConversionRow> = session_counts
        .into_iter()
        .map(|(channel, sessions)| {
            let purchases = purchase_counts.get(channel).copied().unwrap_or(0);
            let conversion_rate = if sessions > 0 {
                Some(purchases as f64 / sessions as f64)
            } else {
                None
            };
            ConversionRow {
                channel: channel.to_string(),
                purchases,
                sessions,
                conversion_rate,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.conversion_rate
            .unwrap_or(0.0)
            .total_cmp(&a.conversion_rate.unwrap_or(0.0))
            .then_with(|| a.channel.cmp(&b.channel))
    });
    rows
}

/// Maps a purchase to the session whose `[start, end]` contains it.
struct SessionLocator<'a> {
    by_identity: HashMap<&'a str, Vec<&'a Session>>,
}

impl<'a> SessionLocator<'a> {
    fn build(sessions: &'a [Session]) -> Self {
        let mut by_identity: HashMap<&str, Vec<&Session>> = HashMap::new();
        for s in sessions {
            by_identity.entry(s.identity.as_str()).or_default().push(s);
        }
        for list in by_identity.values_mut() {
            list.sort_by_key(|s| s.start);
        }
        Self { by_identity }
    }

    fn containing(&self, purchase: &AttributedPurchase) -> Option<&'a Session> {
        let identity = purchase.identity.as_deref()?;
        let ts = purchase.timestamp?;
        let list = self.by_identity.get(identity)?;
        // Last session starting at or before the purchase; intervals per
        // identity never overlap, so it is the only candidate.
        let pos = list.partition_point(|s| s.start <= ts);
        let candidate = list.get(pos.checked_sub(1)?)?;
        candidate.contains(ts).then_some(*candidate)
    }
}

fn device_rollup(
    events: &[CanonicalEvent],
    sessions: &[Session],
    purchases: &[AttributedPurchase],
) -> Vec<DeviceRollup> {
    let mut grouped: BTreeMap<DeviceClass, (u64, f64, u64)> = BTreeMap::new();

    for p in purchases {
        let ua = events[p.event_index].user_agent.as_deref();
        let entry = grouped.entry(classify_device(ua)).or_default();
        entry.0 += 1;
        entry.1 += p.revenue;
    }

    // Session device comes from the session's first member event.
    for s in sessions {
        let ua = s
            .members
            .first()
            .and_then(|&i| events[i].user_agent.as_deref());
        grouped.entry(classify_device(ua)).or_default().2 += 1;
    }

    grouped
        .into_iter()
        .map(|(device, (purchases, revenue, sessions))| DeviceRollup {
            device,
            purchases,
            revenue,
            sessions,
            revenue_per_session: (sessions > 0).then(|| revenue / sessions as f64),
        })
        .collect()
}

fn daily_revenue(purchases: &[AttributedPurchase]) -> Vec<DailyRevenueRow> {
    let mut grouped: BTreeMap<NaiveDate, (u64, f64)> = BTreeMap::new();
    for p in purchases {
        // Purchases with unparseable timestamps have no day to land in.
        let Some(ts) = p.timestamp else {
            continue;
        };
        let entry = grouped.entry(ts.date_naive()).or_default();
        entry.0 += 1;
        entry.1 += p.revenue;
    }

    grouped
        .into_iter()
        .map(|(date, (purchases, revenue))| DailyRevenueRow {
            date,
            purchases,
            revenue,
            avg_order_value: revenue / purchases as f64,
        })
        .collect()
}

fn conversion_type_rollup(purchases: &[AttributedPurchase]) -> Vec<ConversionTypeRollup> {
    let mut grouped: HashMap<ConversionType, (u64, f64)> = HashMap::new();
    for p in purchases {
        let entry = grouped.entry(p.conversion_type).or_default();
        entry.0 += 1;
        entry.1 += p.revenue;
    }

    let mut rows: Vec<ConversionTypeRollup> = grouped
        .into_iter()
        .map(|(conversion_type, (purchases, revenue))| ConversionTypeRollup {
            conversion_type,
            purchases,
            revenue,
        })
        .collect();
    rows.sort_by(|a, b| b.purchases.cmp(&a.purchases));
    rows
}

fn identity_summaries(events: &[CanonicalEvent], sessions: &[Session]) -> Vec<IdentitySummary> {
    let mut session_counts: HashMap<&str, u64> = HashMap::new();
    for s in sessions {
        *session_counts.entry(s.identity.as_str()).or_default() += 1;
    }

    let mut spans: BTreeMap<&str, (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> =
        BTreeMap::new();
    for e in events {
        let (Some(identity), Some(ts)) = (e.identity.as_deref(), e.timestamp) else {
            continue;
        };
        spans
            .entry(identity)
            .and_modify(|(first, last)| {
                *first = (*first).min(ts);
                *last = (*last).max(ts);
            })
            .or_insert((ts, ts));
    }

    spans
        .into_iter()
        .map(|(identity, (first_seen, last_seen))| IdentitySummary {
            identity: identity.to_string(),
            first_seen,
            last_seen,
            sessions: session_counts.get(identity).copied().unwrap_or(0),
        })
        .collect()
}

fn quality_summary(
    events: &[CanonicalEvent],
    purchases: &[AttributedPurchase],
    counts: StageCounts,
) -> QualitySummary {
    let total_events = events.len();
    // Trust the feed's flags, but also catch records the feed forgot to
    // flag by deriving the same condition locally.
    let null_identity = events
        .iter()
        .filter(|e| e.identity.is_none() || e.flags.identity_missing)
        .count();
    let unparseable_timestamp = events
        .iter()
        .filter(|e| e.timestamp.is_none() || e.flags.timestamp_unparseable)
        .count();
    // A parse failure means a payload was present but did not parse.
    let payload_parse_failures = events
        .iter()
        .filter(|e| e.flags.json_parse_failed || (e.raw_payload.is_some() && e.payload.is_none()))
        .count();
    let unrecognized_event_names = events
        .iter()
        .filter(|e| e.flags.event_name_unrecognized || !e.is_recognized_event())
        .count();

    let ingested = total_events + counts.duplicates_removed;
    let rate = |n: usize, d: usize| if d > 0 { n as f64 / d as f64 } else { 0.0 };

    QualitySummary {
        total_events,
        purchase_count: purchases.len(),
        duplicates_removed: counts.duplicates_removed,
        null_identity,
        unparseable_timestamp,
        payload_parse_failures,
        unrecognized_event_names,
        unresolved_revenue_purchases: counts.unresolved_revenue_purchases,
        sessionization_skipped: counts.sessionization_skipped,
        null_identity_rate: rate(null_identity, total_events),
        duplicate_rate: rate(counts.duplicates_removed, ingested),
        payload_error_rate: rate(payload_parse_failures, total_events),
        latest_event_date: events
            .iter()
            .filter_map(|e| e.timestamp)
            .max()
            .map(|ts| ts.date_naive()),
    }
}
