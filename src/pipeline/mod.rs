//! Batch pipeline orchestration.
//!
//! Stages are pure input-tables-to-output-tables functions; intermediate
//! results are threaded through arguments and returns, never through
//! shared mutable state. Dedup feeds both the sessionizer and the
//! attribution engine; rollups join their outputs; the monitor reads
//! only the rollups.

pub mod attribution;
pub mod dedup;
pub mod monitor;
pub mod rollup;
pub mod sessionize;

use anyhow::Result;
use tracing::info;

use crate::config::PipelineConfig;
use crate::models::{AttributedPurchase, CanonicalEvent, Session};
use crate::pipeline::monitor::MonitorReport;
use crate::pipeline::rollup::{RollupTables, StageCounts};

/// Everything one run produces, in dependency order.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Deduplicated canonical event table.
    pub events: Vec<CanonicalEvent>,
    pub duplicates_removed: usize,
    pub sessions: Vec<Session>,
    pub purchases: Vec<AttributedPurchase>,
    pub rollups: RollupTables,
    pub report: MonitorReport,
}

/// Run the full batch: dedup, sessionize, attribute, roll up, monitor.
///
/// Only internal-consistency defects (reconciliation) error out; data
/// defects flow through as quality counts and monitor alerts.
pub fn run(events: Vec<CanonicalEvent>, config: &PipelineConfig) -> Result<PipelineOutput> {
    info!(ingested = events.len(), "pipeline start");

    let deduped = dedup::dedup_events(events);
    let events = deduped.events;

    let sessionized = sessionize::build_sessions(&events, config.session_gap_seconds);
    let attributed = attribution::attribute_purchases(&events, config.lookback_days);

    let counts = StageCounts {
        duplicates_removed: deduped.removed,
        sessionization_skipped: sessionized.skipped_unparseable,
        unresolved_revenue_purchases: attributed.unresolved_revenue,
    };
    let rollups = rollup::build_rollups(
        &events,
        &sessionized.sessions,
        &attributed.purchases,
        counts,
    )?;

    let report = monitor::run_monitor(
        &rollups.quality,
        &rollups.daily_revenue,
        &rollups.channel_last_click,
        &config.monitor,
    );

    info!(
        events = events.len(),
        sessions = sessionized.sessions.len(),
        purchases = attributed.purchases.len(),
        status = ?report.status,
        "pipeline complete"
    );

    Ok(PipelineOutput {
        events,
        duplicates_removed: deduped.removed,
        sessions: sessionized.sessions,
        purchases: attributed.purchases,
        rollups,
        report,
    })
}
