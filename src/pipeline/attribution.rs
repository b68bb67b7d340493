//! First/last-touch attribution over a trailing lookback window.
//!
//! Every purchase independently scans its own identity's timeline. To
//! keep that a bounded range scan instead of a correlated full scan,
//! touch events are indexed per identity and timestamp-sorted up front;
//! each purchase then binary-searches its `[ts - lookback, ts]` window.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use tracing::debug;

use crate::models::{AttributedPurchase, CanonicalEvent, ConversionType};

/// Attributed purchases plus the count of purchases whose revenue could
/// not be resolved (recorded as 0, never excluded).
#[derive(Debug)]
pub struct AttributionOutcome {
    pub purchases: Vec<AttributedPurchase>,
    pub unresolved_revenue: usize,
}

/// Per-identity index of marketing touches, sorted by (timestamp,
/// ingestion order) so window boundaries resolve with `partition_point`
/// and timestamp ties resolve by ingestion order.
struct TouchIndex<'a> {
    by_identity: HashMap<&'a str, Vec<(DateTime<Utc>, usize)>>,
}

impl<'a> TouchIndex<'a> {
    fn build(events: &'a [CanonicalEvent]) -> Self {
        let mut by_identity: HashMap<&str, Vec<(DateTime<Utc>, usize)>> = HashMap::new();
        for (idx, event) in events.iter().enumerate() {
            if !event.is_touch() {
                continue;
            }
            let (Some(identity), Some(ts)) = (event.identity.as_deref(), event.timestamp) else {
                continue;
            };
            by_identity.entry(identity).or_default().push((ts, idx));
        }
        for touches in by_identity.values_mut() {
            touches.sort_by_key(|&(ts, idx)| (ts, idx));
        }
        Self { by_identity }
    }

    /// Touches for `identity` with timestamp in `[from, to]`, inclusive
    /// on both ends.
    fn window(&self, identity: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> &[(DateTime<Utc>, usize)] {
        let Some(touches) = self.by_identity.get(identity) else {
            return &[];
        };
        let lo = touches.partition_point(|&(ts, _)| ts < from);
        let hi = touches.partition_point(|&(ts, _)| ts <= to);
        &touches[lo..hi]
    }
}

/// Produce exactly one `AttributedPurchase` per purchase event.
///
/// Purchases with no identity or no parseable timestamp cannot be
/// correlated and come out with null touch fields (downstream: "direct"),
/// but they are still emitted; the reconciliation check depends on no
/// purchase ever being dropped.
pub fn attribute_purchases(events: &[CanonicalEvent], lookback_days: i64) -> AttributionOutcome {
    let index = TouchIndex::build(events);
    let lookback = Duration::days(lookback_days);

    let purchase_indices: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_purchase())
        .map(|(i, _)| i)
        .collect();

    let purchases: Vec<AttributedPurchase> = purchase_indices
        .into_par_iter()
        .map(|idx| attribute_one(idx, events, &index, lookback))
        .collect();

    let unresolved_revenue = purchases.iter().filter(|p| p.revenue <= 0.0).count();
    debug!(
        purchases = purchases.len(),
        unresolved_revenue, "attribution complete"
    );

    AttributionOutcome {
        purchases,
        unresolved_revenue,
    }
}

fn attribute_one(
    idx: usize,
    events: &[CanonicalEvent],
    index: &TouchIndex<'_>,
    lookback: Duration,
) -> AttributedPurchase {
    let purchase = &events[idx];

    let candidates: &[(DateTime<Utc>, usize)] =
        match (purchase.identity.as_deref(), purchase.timestamp) {
            (Some(identity), Some(ts)) => index.window(identity, ts - lookback, ts),
            _ => &[],
        };

    // Sorted by (timestamp, ingestion order): the first element is the
    // earliest touch with earliest-ingestion tie-break, the last is the
    // most recent with latest-ingestion tie-break. The purchase itself
    // qualifies as its own last touch when it carries UTM parameters.
    let first = candidates.first().map(|&(_, i)| &events[i]);
    let last = candidates.last().map(|&(_, i)| &events[i]);

    let first_touch_channel = first.and_then(|e| e.utm_source.clone());
    let last_touch_channel = last.and_then(|e| e.utm_source.clone());
    let conversion_type = ConversionType::classify(
        first_touch_channel.as_deref(),
        last_touch_channel.as_deref(),
    );

    AttributedPurchase {
        event_index: idx,
        identity: purchase.identity.clone(),
        timestamp: purchase.timestamp,
        revenue: purchase.revenue(),
        first_touch_channel,
        first_touch_medium: first.and_then(|e| e.utm_medium.clone()),
        first_touch_campaign: first.and_then(|e| e.utm_campaign.clone()),
        last_touch_channel,
        last_touch_medium: last.and_then(|e| e.utm_medium.clone()),
        last_touch_campaign: last.and_then(|e| e.utm_campaign.clone()),
        conversion_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QualityFlags;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    fn event(
        identity: Option<&str>,
        ts: Option<DateTime<Utc>>,
        name: &str,
        utm: Option<(&str, &str, &str)>,
        total: Option<f64>,
    ) -> CanonicalEvent {
        CanonicalEvent {
            source_file: "events_test.csv".into(),
            identity: identity.map(|s| s.into()),
            raw_timestamp: ts.map(|t| t.to_rfc3339()),
            timestamp: ts,
            event_name: name.into(),
            raw_payload: None,
            payload: None,
            page_url: None,
            referrer: None,
            user_agent: None,
            utm_source: utm.map(|(s, _, _)| s.into()),
            utm_medium: utm.map(|(_, m, _)| m.into()),
            utm_campaign: utm.map(|(_, _, c)| c.into()),
            price: None,
            unit_price: None,
            quantity: None,
            total,
            product_id: None,
            flags: QualityFlags::default(),
        }
    }

    #[test]
    fn first_and_last_touch_within_window() {
        let events = vec![
            event(Some("u1"), Some(at(0)), "page_viewed", Some(("ads", "cpc", "spring")), None),
            event(Some("u1"), Some(at(100)), "page_viewed", Some(("email", "newsletter", "w23")), None),
            event(Some("u1"), Some(at(200)), "purchase", None, Some(50.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        assert_eq!(outcome.purchases.len(), 1);
        let p = &outcome.purchases[0];
        assert_eq!(p.first_touch_channel.as_deref(), Some("ads"));
        assert_eq!(p.first_touch_medium.as_deref(), Some("cpc"));
        assert_eq!(p.last_touch_channel.as_deref(), Some("email"));
        assert_eq!(p.last_touch_campaign.as_deref(), Some("w23"));
        assert_eq!(p.revenue, 50.0);
        assert_eq!(p.conversion_type, ConversionType::Assisted);
    }

    #[test]
    fn window_boundary_is_inclusive_at_seven_days() {
        let seven_days = 7 * 86_400;
        let events = vec![
            event(Some("u1"), Some(at(0)), "page_viewed", Some(("ads", "cpc", "c")), None),
            event(Some("u1"), Some(at(seven_days)), "purchase", None, Some(10.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        assert_eq!(
            outcome.purchases[0].last_touch_channel.as_deref(),
            Some("ads")
        );

        // One second past the window: excluded.
        let events = vec![
            event(Some("u1"), Some(at(0)), "page_viewed", Some(("ads", "cpc", "c")), None),
            event(Some("u1"), Some(at(seven_days + 1)), "purchase", None, Some(10.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        assert!(outcome.purchases[0].last_touch_channel.is_none());
        assert_eq!(
            outcome.purchases[0].conversion_type,
            ConversionType::PureDirect
        );
    }

    #[test]
    fn purchase_can_be_its_own_last_touch() {
        let events = vec![
            event(Some("u1"), Some(at(0)), "page_viewed", Some(("ads", "cpc", "c")), None),
            event(Some("u1"), Some(at(50)), "purchase", Some(("retarget", "cpc", "c2")), Some(10.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        let p = &outcome.purchases[0];
        assert_eq!(p.first_touch_channel.as_deref(), Some("ads"));
        assert_eq!(p.last_touch_channel.as_deref(), Some("retarget"));
    }

    #[test]
    fn touches_after_purchase_are_ignored() {
        let events = vec![
            event(Some("u1"), Some(at(100)), "purchase", None, Some(10.0)),
            event(Some("u1"), Some(at(200)), "page_viewed", Some(("ads", "cpc", "c")), None),
        ];
        let outcome = attribute_purchases(&events, 7);
        assert!(outcome.purchases[0].first_touch_channel.is_none());
    }

    #[test]
    fn medium_without_source_is_not_a_touch() {
        let mut touch = event(Some("u1"), Some(at(0)), "page_viewed", None, None);
        touch.utm_medium = Some("cpc".into());
        touch.utm_campaign = Some("spring".into());
        let events = vec![
            touch,
            event(Some("u1"), Some(at(100)), "purchase", None, Some(10.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        let p = &outcome.purchases[0];
        assert!(p.last_touch_channel.is_none());
        assert!(p.last_touch_medium.is_none());
    }

    #[test]
    fn timestamp_ties_break_by_ingestion_order() {
        let events = vec![
            event(Some("u1"), Some(at(0)), "page_viewed", Some(("a", "m1", "c1")), None),
            event(Some("u1"), Some(at(0)), "page_viewed", Some(("b", "m2", "c2")), None),
            event(Some("u1"), Some(at(10)), "purchase", None, Some(10.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        let p = &outcome.purchases[0];
        assert_eq!(p.first_touch_channel.as_deref(), Some("a"));
        assert_eq!(p.last_touch_channel.as_deref(), Some("b"));
    }

    #[test]
    fn anonymous_and_unparseable_purchases_are_still_emitted() {
        let events = vec![
            event(None, Some(at(0)), "purchase", None, Some(5.0)),
            event(Some("u1"), None, "purchase", None, Some(7.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        assert_eq!(outcome.purchases.len(), 2);
        assert!(outcome
            .purchases
            .iter()
            .all(|p| p.last_touch_channel.is_none()));
        let revenue: f64 = outcome.purchases.iter().map(|p| p.revenue).sum();
        assert_eq!(revenue, 12.0);
    }

    #[test]
    fn unresolved_revenue_is_zero_and_counted() {
        let events = vec![event(Some("u1"), Some(at(0)), "purchase", None, None)];
        let outcome = attribute_purchases(&events, 7);
        assert_eq!(outcome.purchases[0].revenue, 0.0);
        assert_eq!(outcome.unresolved_revenue, 1);
    }

    #[test]
    fn other_identities_never_leak_into_the_window() {
        let events = vec![
            event(Some("u2"), Some(at(0)), "page_viewed", Some(("ads", "cpc", "c")), None),
            event(Some("u1"), Some(at(100)), "purchase", None, Some(10.0)),
        ];
        let outcome = attribute_purchases(&events, 7);
        assert!(outcome.purchases[0].first_touch_channel.is_none());
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let outcome = attribute_purchases(&[], 7);
        assert!(outcome.purchases.is_empty());
    }
}
