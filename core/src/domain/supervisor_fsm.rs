// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The pure per-service state transition table (spec §4.3). No I/O, no
//! clock reads: the Supervisor worker (`application::supervisor`) is the
//! only caller, and it is responsible for deciding *when* an event fires
//! and for carrying out the resulting actions against the container
//! driver.
//!
//! Composite rows from the spec table ("STOPPING→SLEEPING", reload's
//! "STOPPING→STOPPED→STARTING") are not special-cased here: the caller
//! drives them by issuing the constituent events (`Stop` then, once
//! `ContainerGone` lands, `Start`) through this same table, which keeps
//! exactly one state per observation (invariant 1, spec §8).

use super::service::{Phase, Priority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    Start,
    HealthOk,
    HealthFailExhausted,
    Sleep,
    IdleTimeoutElapsed,
    Stop,
    ActivityDemand,
    WakeTimeout,
    ContainerGone,
    BackoffElapsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateAndStartContainer,
    ResetFailureStreak,
    EmitServiceStarted,
    HoldForBackoff,
    PauseContainer,
    StopContainer,
    UnpauseContainer,
    EmitWakeComplete,
    MarkFailedForRestart,
    RemoveHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub to: Phase,
    pub actions: Vec<Action>,
}

impl Transition {
    fn new(to: Phase, actions: &[Action]) -> Self {
        Self { to, actions: actions.to_vec() }
    }
}

/// Returns `None` when `event` has no defined effect from `current` (an
/// invalid transition request — the caller treats this as a `Conflict`).
///
/// `priority` guards invariant 5 ("no service transitions through SLEEPING
/// while priority=high"): `Sleep` and `IdleTimeoutElapsed` are refused for
/// high-priority services regardless of current phase.
pub fn transition(current: Phase, event: SupervisorEvent, priority: Priority) -> Option<Transition> {
    use Phase::*;
    use SupervisorEvent::*;

    if priority == Priority::High && matches!(event, Sleep | IdleTimeoutElapsed) {
        return None;
    }

    match (current, event) {
        (Stopped, Start) => Some(Transition::new(Starting, &[Action::CreateAndStartContainer])),
        (Starting, HealthOk) => Some(Transition::new(
            Running,
            &[Action::ResetFailureStreak, Action::EmitServiceStarted],
        )),
        (Starting, HealthFailExhausted) => Some(Transition::new(Failed, &[Action::HoldForBackoff])),
        (Running, Sleep) => Some(Transition::new(Sleeping, &[Action::PauseContainer])),
        (Running, IdleTimeoutElapsed) => Some(Transition::new(Sleeping, &[Action::PauseContainer])),
        (Running, Stop) => Some(Transition::new(Stopping, &[Action::StopContainer])),
        (Sleeping, ActivityDemand) => Some(Transition::new(Waking, &[Action::UnpauseContainer])),
        (Waking, HealthOk) => Some(Transition::new(Running, &[Action::EmitWakeComplete])),
        (Waking, WakeTimeout) => Some(Transition::new(Failed, &[Action::MarkFailedForRestart])),
        (Stopping, ContainerGone) => Some(Transition::new(Stopped, &[Action::RemoveHandle])),
        (Failed, BackoffElapsed) => Some(Transition::new(Starting, &[Action::CreateAndStartContainer])),
        _ => None,
    }
}

/// Truncated exponential backoff used while `FAILED`: 1s, 2s, 4s, ..., capped
/// at 60s.
pub fn backoff_delay(failure_streak: u32) -> std::time::Duration {
    let capped_exponent = failure_streak.min(6); // 2^6 = 64 -> clamp below
    let secs = 1u64.checked_shl(capped_exponent).unwrap_or(u64::MAX).min(60);
    std::time::Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_priority_never_sleeps() {
        assert!(transition(Phase::Running, SupervisorEvent::Sleep, Priority::High).is_none());
        assert!(transition(Phase::Running, SupervisorEvent::IdleTimeoutElapsed, Priority::High).is_none());
    }

    #[test]
    fn normal_priority_sleeps_on_idle() {
        let t = transition(Phase::Running, SupervisorEvent::IdleTimeoutElapsed, Priority::Normal).unwrap();
        assert_eq!(t.to, Phase::Sleeping);
        assert_eq!(t.actions, vec![Action::PauseContainer]);
    }

    #[test]
    fn wake_cycle() {
        let waking = transition(Phase::Sleeping, SupervisorEvent::ActivityDemand, Priority::Normal).unwrap();
        assert_eq!(waking.to, Phase::Waking);
        let running = transition(Phase::Waking, SupervisorEvent::HealthOk, Priority::Normal).unwrap();
        assert_eq!(running.to, Phase::Running);
    }

    #[test]
    fn invalid_transition_is_none() {
        assert!(transition(Phase::Stopped, SupervisorEvent::HealthOk, Priority::Normal).is_none());
    }

    #[test]
    fn backoff_caps_at_60s() {
        assert_eq!(backoff_delay(0), std::time::Duration::from_secs(1));
        assert_eq!(backoff_delay(1), std::time::Duration::from_secs(2));
        assert_eq!(backoff_delay(10), std::time::Duration::from_secs(60));
    }
}
