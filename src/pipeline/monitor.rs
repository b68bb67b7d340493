//! Drift and integrity monitoring against a rolling baseline.
//!
//! One report per run, HEALTHY → {WARN, CRITICAL}, no retry. Every check
//! is evaluated independently and all findings are reported together;
//! a check that cannot run is listed as skipped, which is distinct from
//! passing. The monitor never mutates upstream data.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MonitorThresholds;
use crate::models::DIRECT_CHANNEL;
use crate::pipeline::rollup::{ChannelRollup, DailyRevenueRow, QualitySummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warn,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
}

/// Overall run verdict: FAIL iff any alert is CRITICAL, PASS iff there
/// are no alerts at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Pass,
    Warn,
    Fail,
}

/// The single source of truth for whether downstream consumers should
/// trust this run's attribution numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorReport {
    /// Most recent event date in the batch; absent for a zero-row batch.
    pub date: Option<NaiveDate>,
    pub alerts: Vec<Alert>,
    /// Checks that could not run, named explicitly so "skipped" is never
    /// mistaken for "passed".
    pub skipped: Vec<String>,
    pub status: RunStatus,
}

impl MonitorReport {
    pub fn is_critical(&self) -> bool {
        self.status == RunStatus::Fail
    }
}

/// Evaluate all drift and integrity checks for one run.
pub fn run_monitor(
    quality: &QualitySummary,
    daily_revenue: &[DailyRevenueRow],
    channel_last_click: &[ChannelRollup],
    thresholds: &MonitorThresholds,
) -> MonitorReport {
    let mut alerts: Vec<Alert> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();

    // Pipeline health: an empty batch or a purchase-free batch means
    // upstream broke, not that nothing happened.
    if quality.total_events == 0 {
        critical(&mut alerts, "No events ingested today");
    }
    if quality.purchase_count == 0 {
        critical(&mut alerts, "No purchases recorded today");
    }

    // Data integrity rates, each against its own threshold (strict >).
    if quality.null_identity_rate > thresholds.max_null_identity_rate {
        warn_alert(
            &mut alerts,
            format!(
                "High null client_id rate: {}",
                percent(quality.null_identity_rate)
            ),
        );
    }
    if quality.duplicate_rate > thresholds.max_duplicate_rate {
        warn_alert(
            &mut alerts,
            format!("Duplicate rate high: {}", percent(quality.duplicate_rate)),
        );
    }
    if quality.payload_error_rate > thresholds.max_payload_error_rate {
        warn_alert(
            &mut alerts,
            format!(
                "JSON parse error rate high: {}",
                percent(quality.payload_error_rate)
            ),
        );
    }

    check_revenue_drop(daily_revenue, thresholds, &mut alerts, &mut skipped);
    check_direct_share(channel_last_click, thresholds, &mut alerts, &mut skipped);

    let status = if alerts.iter().any(|a| a.severity == Severity::Critical) {
        RunStatus::Fail
    } else if alerts.is_empty() {
        RunStatus::Pass
    } else {
        RunStatus::Warn
    };

    let report = MonitorReport {
        date: quality.latest_event_date,
        alerts,
        skipped,
        status,
    };
    match report.status {
        RunStatus::Pass => info!(?report.date, "monitor: PASS"),
        RunStatus::Warn => warn!(?report.date, alerts = report.alerts.len(), "monitor: WARN"),
        RunStatus::Fail => warn!(?report.date, alerts = report.alerts.len(), "monitor: FAIL"),
    }
    report
}

/// Latest day's revenue against the mean of the prior `baseline_days`
/// days. Requires baseline_days + 1 days of history; anything less is a
/// skip, not a pass.
fn check_revenue_drop(
    daily_revenue: &[DailyRevenueRow],
    thresholds: &MonitorThresholds,
    alerts: &mut Vec<Alert>,
    skipped: &mut Vec<String>,
) {
    let mut days: Vec<&DailyRevenueRow> = daily_revenue.iter().collect();
    days.sort_by(|a, b| b.date.cmp(&a.date));

    if days.len() <= thresholds.baseline_days {
        skipped.push("revenue_drop: skipped: insufficient baseline".to_string());
        return;
    }

    let latest = days[0].revenue;
    let baseline_window = &days[1..=thresholds.baseline_days];
    let baseline =
        baseline_window.iter().map(|d| d.revenue).sum::<f64>() / baseline_window.len() as f64;

    if baseline > 0.0 && (baseline - latest) / baseline > thresholds.max_revenue_drop {
        critical(
            alerts,
            format!("Revenue drop detected: {latest:.0} vs baseline {baseline:.0}"),
        );
    }
}

/// Direct-channel share of last-click revenue. Zero total revenue makes
/// the share undefined; skipped, not passed.
fn check_direct_share(
    channel_last_click: &[ChannelRollup],
    thresholds: &MonitorThresholds,
    alerts: &mut Vec<Alert>,
    skipped: &mut Vec<String>,
) {
    let total: f64 = channel_last_click.iter().map(|c| c.revenue).sum();
    if total <= 0.0 {
        skipped.push("direct_share: skipped: zero total revenue".to_string());
        return;
    }

    let direct: f64 = channel_last_click
        .iter()
        .filter(|c| c.channel == DIRECT_CHANNEL)
        .map(|c| c.revenue)
        .sum();
    let share = direct / total;
    if share > thresholds.max_direct_share {
        warn_alert(
            alerts,
            format!("Direct traffic unusually high: {}", percent(share)),
        );
    }
}

fn critical(alerts: &mut Vec<Alert>, message: impl Into<String>) {
    alerts.push(Alert {
        severity: Severity::Critical,
        message: message.into(),
    });
}

fn warn_alert(alerts: &mut Vec<Alert>, message: impl Into<String>) {
    alerts.push(Alert {
        severity: Severity::Warn,
        message: message.into(),
    });
}

fn percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}
