//! Gap-based session reconstruction.
//!
//! Each identity's timeline is processed independently, so the walk
//! parallelizes across identities with no shared state.

use std::collections::HashMap;

use chrono::Duration;
use rayon::prelude::*;
use tracing::debug;

use crate::models::{CanonicalEvent, Session};

/// Sessions plus the count of events excluded because their timestamp
/// failed to parse (they cannot be ordered). Excluded events stay in the
/// canonical table for every other computation.
#[derive(Debug)]
pub struct SessionizeOutcome {
    pub sessions: Vec<Session>,
    pub skipped_unparseable: usize,
}

/// Group each identity's chronologically ordered events into sessions
/// separated by inactivity gaps strictly greater than `gap_seconds`.
pub fn build_sessions(events: &[CanonicalEvent], gap_seconds: i64) -> SessionizeOutcome {
    let mut by_identity: HashMap<&str, Vec<usize>> = HashMap::new();
    let mut skipped_unparseable = 0usize;

    for (idx, event) in events.iter().enumerate() {
        let Some(identity) = event.identity.as_deref() else {
            continue;
        };
        if event.timestamp.is_none() {
            skipped_unparseable += 1;
            continue;
        }
        by_identity.entry(identity).or_default().push(idx);
    }

    // Deterministic partition order so session output is stable run to run.
    let mut partitions: Vec<(&str, Vec<usize>)> = by_identity.into_iter().collect();
    partitions.sort_by(|a, b| a.0.cmp(b.0));

    let gap = Duration::seconds(gap_seconds);
    let sessions: Vec<Session> = partitions
        .into_par_iter()
        .flat_map(|(identity, indices)| sessionize_identity(identity, indices, events, gap))
        .collect();

    debug!(
        sessions = sessions.len(),
        skipped_unparseable, "session reconstruction complete"
    );

    SessionizeOutcome {
        sessions,
        skipped_unparseable,
    }
}

/// Walk one identity's timeline and cut sessions at the gap boundary.
/// The comparison is strict, so a gap of exactly `gap` keeps the run going.
fn sessionize_identity(
    identity: &str,
    mut indices: Vec<usize>,
    events: &[CanonicalEvent],
    gap: Duration,
) -> Vec<Session> {
    // Stable on ties: equal timestamps keep original ingestion order.
    indices.sort_by_key(|&i| events[i].timestamp);

    let mut sessions = Vec::new();
    let mut members: Vec<usize> = Vec::new();
    let mut prev_ts = None;

    for idx in indices {
        // Unparseable timestamps were filtered before the walk.
        let Some(ts) = events[idx].timestamp else {
            continue;
        };

        if let Some(prev) = prev_ts {
            if ts - prev > gap {
                sessions.push(finish_session(identity, sessions.len() as u64 + 1, members, events));
                members = Vec::new();
            }
        }
        members.push(idx);
        prev_ts = Some(ts);
    }

    if !members.is_empty() {
        sessions.push(finish_session(identity, sessions.len() as u64 + 1, members, events));
    }

    sessions
}

fn finish_session(
    identity: &str,
    sequence: u64,
    members: Vec<usize>,
    events: &[CanonicalEvent],
) -> Session {
    // Members are timestamp-sorted, so bounds are the ends of the run.
    let start = events[members[0]].timestamp.unwrap_or_default();
    let end = events[*members.last().unwrap_or(&members[0])]
        .timestamp
        .unwrap_or_default();

    // Most recent member with a utm_source; latest ingestion order wins
    // on timestamp ties because members are stably sorted.
    let last_touch_channel = members
        .iter()
        .rev()
        .find_map(|&i| events[i].utm_source.clone());

    Session {
        identity: identity.to_string(),
        sequence,
        session_id: Session::session_id_for(identity, sequence),
        start,
        end,
        duration_seconds: (end - start).num_seconds(),
        members,
        last_touch_channel,
    }
}
