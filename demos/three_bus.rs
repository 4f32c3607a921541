//! Solves a three bus network with every method and prints the reports.
//!
//! `RUST_LOG=debug cargo run --example three_bus` shows the per-iteration mismatch.
use rustpower_flow::prelude::*;

fn network() -> Result<NetworkSnapshot, PfError> {
    let model = AdmittanceModel::from_branches(
        3,
        vec![
            AdmittanceBranch::line(0, 1, 0.02, 0.06, 0.06).with_rating(150.0),
            AdmittanceBranch::line(0, 2, 0.08, 0.24, 0.05).with_rating(100.0),
            AdmittanceBranch::line(1, 2, 0.06, 0.18, 0.04).with_rating(100.0),
        ],
    )?;
    NetworkSnapshot::new(
        model,
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -100.0, -50.0),
            Bus::pv(2, 50.0, 1.02).with_q_limits(-30.0, 60.0),
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

    let snapshot = network()?;
    let criteria = ConvergenceCriteria::default().with_q_limit_enforcement(true, QLimitPolicy::Permanent);
    for method in [
        Method::NewtonRaphson,
        Method::FastDecoupled,
        Method::Helm,
        Method::LinearizedDc,
    ] {
        let result = run(&snapshot, method, None, &criteria);
        println!("{}\n", PowerFlowReport::from_result(&snapshot, &result));
    }

    let result = run_with_fallback(
        &snapshot,
        &[Method::FastDecoupled, Method::NewtonRaphson],
        None,
        &criteria,
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
