//! PV→PQ switching on reactive power limits.
use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;
use tracing::debug;

use super::{
    config::QLimitPolicy,
    system::{Bus, BusType},
};

/// Upper bound on solve passes when reactive limits are enforced.
pub const MAX_Q_PASSES: usize = 10;

/// Calculated reactive injection of every bus in MVAr, original bus order.
pub(crate) fn reactive_injection(
    y_bus: &CscMatrix<Complex64>,
    v: &DVector<Complex64>,
    s_base_mva: f64,
) -> DVector<f64> {
    v.component_mul(&(y_bus * v).conjugate())
        .map(|s| s.im * s_base_mva)
}

/// Applies the reactive limits to the solve-local bus table.
///
/// `scheduled` is the bus table of the snapshot and tells which buses started as PV. Returns
/// whether any bus changed type, in which case the system has to be solved again.
pub(crate) fn enforce_q_limits(
    buses: &mut [Bus],
    scheduled: &[Bus],
    q_mvar: &DVector<f64>,
    v: &DVector<Complex64>,
    policy: QLimitPolicy,
) -> bool {
    let mut changed = false;
    for (bus, orig) in buses.iter_mut().zip(scheduled) {
        let Some(lim) = orig.q_limits else {
            continue;
        };
        let q = q_mvar[bus.index];
        match bus.bus_type {
            BusType::PV if q > lim.max_mvar || q < lim.min_mvar => {
                let limit = if q > lim.max_mvar { lim.max_mvar } else { lim.min_mvar };
                debug!(bus = bus.index, q_mvar = q, limit, "PV bus hits reactive limit");
                bus.bus_type = BusType::PQ;
                bus.q_mvar = limit;
                changed = true;
            }
            BusType::PQ if policy == QLimitPolicy::Reevaluate && orig.bus_type == BusType::PV => {
                let vm = v[bus.index].norm();
                let recovered = (bus.q_mvar == lim.max_mvar && vm > orig.vm_pu)
                    || (bus.q_mvar == lim.min_mvar && vm < orig.vm_pu);
                if recovered {
                    debug!(bus = bus.index, vm, "restoring PV bus");
                    *bus = orig.clone();
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testcases::*;

    #[test]
    fn test_pv_bus_switched_at_upper_limit() {
        let snap = q_limited_two_bus();
        let mut buses = snap.buses().to_vec();
        let v = DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(1.05, 0.0)]);
        let q = reactive_injection(snap.admittance().y_bus(), &v, snap.s_base());
        // 1.05 * (1.05 - 1.0) / 0.1 p.u.
        assert!((q[1] - 52.5).abs() < 1e-9);

        assert!(enforce_q_limits(&mut buses, snap.buses(), &q, &v, QLimitPolicy::Permanent));
        assert_eq!(buses[1].bus_type, BusType::PQ);
        assert_eq!(buses[1].q_mvar, 20.0);
        // a second check with the same state changes nothing
        assert!(!enforce_q_limits(&mut buses, snap.buses(), &q, &v, QLimitPolicy::Permanent));
    }

    #[test]
    fn test_reevaluate_restores_recovered_bus() {
        let snap = q_limited_two_bus();
        let mut buses = snap.buses().to_vec();
        buses[1].bus_type = BusType::PQ;
        buses[1].q_mvar = 20.0;
        let v = DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(1.06, 0.0)]);
        let q = DVector::from_vec(vec![0.0, 20.0]);

        let mut permanent = buses.clone();
        assert!(!enforce_q_limits(&mut permanent, snap.buses(), &q, &v, QLimitPolicy::Permanent));
        assert_eq!(permanent[1].bus_type, BusType::PQ);

        assert!(enforce_q_limits(&mut buses, snap.buses(), &q, &v, QLimitPolicy::Reevaluate));
        assert_eq!(buses[1], snap.buses()[1]);
    }

    #[test]
    fn test_bus_without_limits_is_untouched() {
        let snap = three_bus();
        let mut buses = snap.buses().to_vec();
        let q = DVector::from_vec(vec![0.0, 0.0, 1e6]);
        let v = snap.flat_start();
        assert!(!enforce_q_limits(&mut buses, snap.buses(), &q, &v, QLimitPolicy::Reevaluate));
    }
}
