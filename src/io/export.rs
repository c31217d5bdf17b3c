//! CSV and JSON export of a finished steering run.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::scenario::RunOutcome;
use crate::steering::{RoundRecord, SteeringReport};

/// Column header for the per-interval profile export.
const PROFILE_HEADER: &str = "interval,time_hr,target_w,aggregate_w,difference_w,base_w";

/// Column header for the round log export.
const ROUNDS_HEADER: &str = "iteration,winner,improvement_w,distance_w,elapsed_ms";

/// Exports the final profile of `outcome` to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_profile_csv(outcome: &RunOutcome, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_profile_csv(outcome, io::BufWriter::new(file))
}

/// Writes one row per interval: target, aggregate, their difference, and base load.
///
/// Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_profile_csv(outcome: &RunOutcome, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(PROFILE_HEADER.split(','))?;

    for (t, (target, x)) in outcome.target.iter().zip(&outcome.profile).enumerate() {
        let base = outcome.base_load.get(t).copied().unwrap_or(0.0);
        wtr.write_record(&[
            t.to_string(),
            format!("{:.2}", outcome.horizon.time_hr(t)),
            format!("{target:.3}"),
            format!("{x:.3}"),
            format!("{:.3}", x - target),
            format!("{base:.3}"),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// Exports the round log to a CSV file.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_rounds_csv(rounds: &[RoundRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_rounds_csv(rounds, io::BufWriter::new(file))
}

/// Writes one row per round; rounds without a winner have an empty winner column.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_rounds_csv(rounds: &[RoundRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(ROUNDS_HEADER.split(','))?;

    for r in rounds {
        wtr.write_record(&[
            r.iteration.to_string(),
            r.winner.clone().unwrap_or_default(),
            format!("{:.4}", r.improvement),
            format!("{:.4}", r.distance),
            format!("{:.3}", r.elapsed_ms),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    backend: &'a str,
    horizon: usize,
    dt_hours: f64,
    report: &'a SteeringReport,
}

/// Writes the run summary (backend, horizon, report) as pretty JSON.
///
/// # Errors
///
/// Returns an `io::Error` if serialization or writing fails.
pub fn write_summary_json(outcome: &RunOutcome, writer: impl Write) -> io::Result<()> {
    let summary = Summary {
        backend: outcome.backend,
        horizon: outcome.horizon.len(),
        dt_hours: outcome.horizon.dt_hours,
        report: &outcome.report,
    };
    serde_json::to_writer_pretty(writer, &summary).map_err(io::Error::other)
}
