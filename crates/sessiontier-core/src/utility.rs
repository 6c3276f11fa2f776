//! Utility of a (session, placement) pair.
//!
//! ```text
//! reliability = exp(-period / local_mttf)        (1 when local_mttf <= 0)
//! remote_mib  = remote_size / 2^20
//!
//! DROP   = 0
//! LOCAL  = value * reliability
//! BOTH   = value - (write + read * (1 - reliability)) - storage * period * remote_mib
//! REMOTE = value - (read + write)                     - storage * period * remote_mib
//! ```
//!
//! `period` is the predicted length of the next optimization cycle. All
//! functions here are pure.

use tracing::warn;

use crate::model::{OptimizationData, SessionProperties, StorageProperties};
use crate::placement::Placement;

const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Probability that local memory survives the next period.
#[must_use]
pub fn local_reliability(data: &OptimizationData) -> f64 {
    if data.local_mttf > 0.0 {
        (-data.optimizer_period / data.local_mttf).exp()
    } else {
        1.0
    }
}

fn remote_mib(session: &SessionProperties) -> f64 {
    session.remote_bytes() as f64 / BYTES_PER_MIB
}

/// Utility of keeping `session` at `placement` for the next period.
#[must_use]
pub fn evaluate_utility(
    session: &SessionProperties,
    placement: Placement,
    storage: &StorageProperties,
    data: &OptimizationData,
) -> f64 {
    let period = data.optimizer_period;
    let reliability = local_reliability(data);
    let holding = storage.storage_cost * period * remote_mib(session);

    match placement {
        Placement::Drop => 0.0,
        Placement::Local => session.value * reliability,
        Placement::Both => {
            session.value
                - (storage.write_cost + storage.read_cost * (1.0 - reliability))
                - holding
        }
        Placement::Remote => session.value - (storage.read_cost + storage.write_cost) - holding,
    }
}

/// Utility of a session looked up by id; unknown sessions score 0.
#[must_use]
pub fn evaluate_session_utility(
    data: &OptimizationData,
    id: &str,
    placement: Placement,
    storage: &StorageProperties,
) -> f64 {
    match data.session(id) {
        Some(session) => evaluate_utility(session, placement, storage, data),
        None => {
            warn!(session_id = id, %placement, "utility requested for unknown session");
            0.0
        }
    }
}

/// Cost of moving a session through remote storage and holding it there for `duration` seconds.
#[must_use]
pub fn evaluate_costs(session: &SessionProperties, storage: &StorageProperties, duration: f64) -> f64 {
    storage.read_cost + storage.write_cost + duration * remote_mib(session) * storage.storage_cost
}
