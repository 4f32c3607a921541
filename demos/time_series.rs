//! Runs a daily load curve over a five bus network and writes the voltages to CSV.
//!
//! `cargo run --example time_series -- [config.json] [out.csv]`
use std::f64::consts::PI;

use rustpower_flow::prelude::*;
use tracing::info;

fn network() -> Result<NetworkSnapshot, PfError> {
    let line = |f, t, r, x, b| AdmittanceBranch::line(f, t, r, x, b).with_rating(100.0);
    let model = AdmittanceModel::from_branches(
        5,
        vec![
            line(0, 1, 0.05, 0.11, 0.02),
            line(0, 2, 0.05, 0.11, 0.02),
            line(0, 4, 0.03, 0.08, 0.02),
            line(1, 2, 0.04, 0.09, 0.02),
            line(1, 4, 0.04, 0.09, 0.02),
            line(2, 3, 0.06, 0.13, 0.03),
            line(3, 4, 0.04, 0.09, 0.02),
        ],
    )?;
    NetworkSnapshot::new(
        model,
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -40.0, -20.0),
            Bus::pq(2, -25.0, -15.0),
            Bus::pq(3, -40.0, -20.0),
            Bus::pq(4, -50.0, -20.0),
        ],
        100.0,
    )
}

fn main() -> Result<(), PfError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => PowerFlowConfig::from_file(path)?,
        None => PowerFlowConfig::default(),
    };
    let out = args.next().unwrap_or_else(|| "time_series.csv".to_string());

    // hourly steps, peak load in the evening
    let mut profile = SnapshotProfile::new(network()?);
    for hour in 0..24 {
        let load = 0.8 + 0.3 * (2.0 * PI * (hour as f64 - 13.0) / 24.0).sin().max(-0.5);
        profile.push_scaling(Some(hour as f64 * 3600.0), load, 1.0);
    }

    let result = TimeSeriesRunner::from_config(&config).run_profile(&profile)?;
    let s = &result.summary;
    info!(
        converged = s.converged,
        failed = s.failed,
        worst = ?s.worst_mismatch,
        "summary"
    );
    write_csv_file(&result, &out)?;
    println!("wrote {} steps to {out}", result.len());
    Ok(())
}
