//! Exact-duplicate removal over the canonical event sequence.

use std::collections::HashSet;

use tracing::debug;

use crate::models::CanonicalEvent;

/// Deduplicated events plus the removed count, which feeds the
/// monitor's duplicate-rate check.
#[derive(Debug)]
pub struct DedupOutcome {
    pub events: Vec<CanonicalEvent>,
    pub removed: usize,
}

/// Remove exact repeats, keeping the first occurrence.
///
/// The duplicate key is `(source_file, raw_timestamp, event_name,
/// raw_payload)`, the pre-parse representation, so two rows that are
/// byte-identical in source count as one regardless of downstream parse
/// success.
pub fn dedup_events(events: Vec<CanonicalEvent>) -> DedupOutcome {
    let input_len = events.len();
    let mut seen: HashSet<(String, Option<String>, String, Option<String>)> =
        HashSet::with_capacity(input_len);

    let events: Vec<CanonicalEvent> = events
        .into_iter()
        .filter(|e| {
            seen.insert((
                e.source_file.clone(),
                e.raw_timestamp.clone(),
                e.event_name.clone(),
                e.raw_payload.clone(),
            ))
        })
        .collect();

    let removed = input_len - events.len();
    debug!(removed, kept = events.len(), "deduplicated event feed");

    DedupOutcome { events, removed }
}
