//! Boundary I/O: canonical feed load and artifact write.
//!
//! The feed collaborator upstream handles file discovery, schema
//! normalization, and permissive payload repair; this module only reads
//! its newline-delimited JSON output and writes the run's artifacts.
//! Both ends are scoped acquisitions: open, use, flush/close on every
//! exit path.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::models::CanonicalEvent;
use crate::payload;
use crate::pipeline::PipelineOutput;

/// Load the canonical event feed from a newline-delimited JSON file.
///
/// One `CanonicalEvent` object per line; blank lines are tolerated. A
/// malformed line is a boundary error (the upstream contract is broken),
/// not a data defect, and carries its line number in the error chain.
pub fn load_events(path: &Path) -> Result<Vec<CanonicalEvent>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open event feed {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut events = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut event: CanonicalEvent = serde_json::from_str(&line).with_context(|| {
            format!("malformed event at {}:{}", path.display(), line_no + 1)
        })?;
        backfill_commerce_fields(&mut event);
        events.push(event);
    }

    info!(events = events.len(), path = %path.display(), "loaded event feed");
    Ok(events)
}

/// Derive commerce fields from the parsed payload when the feed left
/// them unset: payload price keys in precedence order, quantity and
/// identifiers optionally nested under `items`, and
/// `total = unit_price * quantity` when both resolve.
fn backfill_commerce_fields(event: &mut CanonicalEvent) {
    let Some(payload_value) = event.payload.as_ref() else {
        return;
    };

    if event.price.is_none() {
        event.price = payload::first_number(payload_value, payload::PRICE_KEYS);
    }
    if event.quantity.is_none() {
        event.quantity = payload::number_field(payload_value, "quantity")
            .or_else(|| payload::items_number_sum(payload_value, "quantity"));
    }
    if event.unit_price.is_none() {
        event.unit_price = event
            .price
            .or_else(|| payload::items_number_sum(payload_value, "price"));
    }
    if event.product_id.is_none() {
        event.product_id = ["product_id", "item_id", "sku"]
            .iter()
            .find_map(|k| payload::string_field(payload_value, k))
            .or_else(|| payload::items_string_first(payload_value, "product_id"))
            .or_else(|| payload::items_string_first(payload_value, "sku"))
            .or_else(|| payload::items_string_first(payload_value, "item_id"));
    }
    if event.total.is_none() {
        if let (Some(unit_price), Some(quantity)) = (event.unit_price, event.quantity) {
            event.total = Some(unit_price * quantity);
        }
    }
}

/// Write all run artifacts as JSON documents into `out_dir`.
pub fn write_artifacts(out_dir: &Path, output: &PipelineOutput) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output dir {}", out_dir.display()))?;

    write_json(&out_dir.join("events.json"), &output.events)?;
    write_json(&out_dir.join("sessions.json"), &output.sessions)?;
    write_json(&out_dir.join("attribution.json"), &output.purchases)?;
    write_json(&out_dir.join("rollups.json"), &output.rollups)?;
    write_json(&out_dir.join("monitoring_report.json"), &output.report)?;

    info!(out_dir = %out_dir.display(), "artifacts written");
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create artifact {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize artifact {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush artifact {}", path.display()))?;
    debug!(path = %path.display(), "artifact written");
    Ok(())
}
