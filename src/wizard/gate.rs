//! Open/closed decision for an evaluation window.
//!
//! Computed once per load from server data. A session that is open stays open
//! even if the clock passes `end_at`; only a fresh load re-evaluates.

use crate::models::{GateState, LaunchWindow};
use chrono::{DateTime, Utc};

/// Where `now` falls relative to the launch window. Missing bounds are permissive.
pub fn evaluate(launch: &LaunchWindow, now: DateTime<Utc>) -> GateState {
    if let Some(start) = launch.start_at {
        if now < start {
            return GateState::NotYetOpen;
        }
    }
    if let Some(end) = launch.end_at {
        if now > end {
            return GateState::Closed;
        }
    }
    GateState::Open
}

/// Gate for a resolved questionnaire, folding in the global switch and the
/// "no applicable launch" case.
pub fn gate_for(
    launch: Option<&LaunchWindow>,
    evaluations_enabled: bool,
    now: DateTime<Utc>,
) -> GateState {
    match launch {
        Some(launch) if evaluations_enabled => evaluate(launch, now),
        _ => GateState::Disabled,
    }
}
