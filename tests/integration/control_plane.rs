//! Steady-state helpers for control-plane tests.

use std::sync::Arc;

use converge::config::Timeouts;
use converge::machines::MachineClient;
use converge::members::{MemberCountProbe, MemberInspector};
use converge::poll::poll;

/// Wait until the control plane reports exactly `expected` running master
/// machines and `expected` voting members.
///
/// Used both as a pre-flight check (scaling tests refuse to start against
/// a cluster that is already off-size) and as the restoring cleanup after
/// a scaling scenario.
pub async fn ensure_steady_state(
    machines: &MachineClient,
    inspector: &Arc<dyn MemberInspector>,
    expected: usize,
    timeouts: &Timeouts,
) -> Result<(), String> {
    let spec = timeouts.membership_spec();

    poll(&spec, &machines.master_count_probe(expected))
        .await
        .map_err(|e| format!("timed out waiting for {expected} running master machines: {e}"))?;

    poll(&spec, &MemberCountProbe::new(inspector.clone(), expected))
        .await
        .map_err(|e| format!("timed out waiting for {expected} voting members: {e}"))?;

    Ok(())
}
