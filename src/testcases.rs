//! Small networks shared by the unit tests.
use crate::basic::system::{AdmittanceBranch, AdmittanceModel, Bus, NetworkSnapshot};

fn snapshot(n: usize, branches: Vec<AdmittanceBranch>, buses: Vec<Bus>) -> NetworkSnapshot {
    let model = AdmittanceModel::from_branches(n, branches).unwrap();
    NetworkSnapshot::new(model, buses, 100.0).unwrap()
}

/// Slack 1.0∠0, PQ bus drawing 1.0 + j0.5 p.u., PV bus injecting 0.5 p.u. at 1.02 p.u.
pub fn three_bus() -> NetworkSnapshot {
    snapshot(
        3,
        vec![
            AdmittanceBranch::line(0, 1, 0.02, 0.06, 0.06).with_rating(150.0),
            AdmittanceBranch::line(0, 2, 0.08, 0.24, 0.05).with_rating(100.0),
            AdmittanceBranch::line(1, 2, 0.06, 0.18, 0.04).with_rating(100.0),
        ],
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -100.0, -50.0),
            Bus::pv(2, 50.0, 1.02),
        ],
    )
}

/// Five bus distribution demo: one slack and four loads, 100 MVA base.
pub fn five_bus() -> NetworkSnapshot {
    let line = |f, t, r, x, b| AdmittanceBranch::line(f, t, r, x, b).with_rating(100.0);
    snapshot(
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
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -40.0, -20.0),
            Bus::pq(2, -25.0, -15.0),
            Bus::pq(3, -40.0, -20.0),
            Bus::pq(4, -50.0, -20.0),
        ],
    )
}

/// Lightly loaded lossless ring without charging, close to flat voltage.
pub fn lossless_ring() -> NetworkSnapshot {
    snapshot(
        4,
        vec![
            AdmittanceBranch::line(0, 1, 0.0, 0.1, 0.0),
            AdmittanceBranch::line(1, 2, 0.0, 0.15, 0.0),
            AdmittanceBranch::line(2, 3, 0.0, 0.1, 0.0),
            AdmittanceBranch::line(3, 0, 0.0, 0.2, 0.0),
        ],
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -10.0, 0.0),
            Bus::pv(2, 5.0, 1.0),
            Bus::pq(3, -8.0, 0.0),
        ],
    )
}

/// Two disconnected pairs of buses; only the first pair has a slack.
pub fn two_island() -> NetworkSnapshot {
    snapshot(
        4,
        vec![
            AdmittanceBranch::line(0, 1, 0.01, 0.1, 0.0),
            AdmittanceBranch::line(2, 3, 0.01, 0.1, 0.0),
        ],
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -10.0, -5.0),
            Bus::pv(2, 10.0, 1.0),
            Bus::pq(3, -10.0, -5.0),
        ],
    )
}

/// Two disconnected pairs of buses, each with its own slack.
pub fn two_island_two_slacks() -> NetworkSnapshot {
    snapshot(
        4,
        vec![
            AdmittanceBranch::line(0, 1, 0.01, 0.1, 0.0),
            AdmittanceBranch::line(2, 3, 0.01, 0.1, 0.0),
        ],
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -10.0, -5.0),
            Bus::slack(2, 1.0, 0.0),
            Bus::pq(3, -20.0, -5.0),
        ],
    )
}

/// No injections and no shunts: the flat start is already the solution.
pub fn flat_zero_injection() -> NetworkSnapshot {
    snapshot(
        3,
        vec![
            AdmittanceBranch::line(0, 1, 0.01, 0.1, 0.0),
            AdmittanceBranch::line(1, 2, 0.02, 0.1, 0.0),
        ],
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, 0.0, 0.0),
            Bus::pv(2, 0.0, 1.0),
        ],
    )
}

/// A PV bus holding 1.05 p.u. behind 0.1 p.u. reactance needs about 52 MVAr, above its limit.
pub fn q_limited_two_bus() -> NetworkSnapshot {
    snapshot(
        2,
        vec![AdmittanceBranch::line(0, 1, 0.0, 0.1, 0.0)],
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pv(1, 0.0, 1.05).with_q_limits(-20.0, 20.0),
        ],
    )
}

/// Slack and one PV bus: the state has no magnitude unknowns.
pub fn pv_only_two_bus() -> NetworkSnapshot {
    snapshot(
        2,
        vec![AdmittanceBranch::line(0, 1, 0.01, 0.1, 0.0)],
        vec![Bus::slack(0, 1.0, 0.0), Bus::pv(1, 20.0, 1.01)],
    )
}

/// Bus 2 is tied to the grid by a purely resistive link, so it has no XB susceptance.
pub fn resistive_link() -> NetworkSnapshot {
    snapshot(
        3,
        vec![
            AdmittanceBranch::line(0, 1, 0.01, 0.1, 0.0),
            AdmittanceBranch::line(1, 2, 0.05, 0.0, 0.0),
        ],
        vec![
            Bus::slack(0, 1.0, 0.0),
            Bus::pq(1, -10.0, -5.0),
            Bus::pq(2, -5.0, -1.0),
        ],
    )
}

/// A load far beyond the transfer capability of its feeder: no operating point exists.
pub fn infeasible_two_bus() -> NetworkSnapshot {
    snapshot(
        2,
        vec![AdmittanceBranch::line(0, 1, 0.05, 0.5, 0.0)],
        vec![Bus::slack(0, 1.0, 0.0), Bus::pq(1, -500.0, -300.0)],
    )
}
