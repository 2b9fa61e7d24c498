//! Debouncing and arbitration of gesture candidates.
//!
//! Every [`GestureKind`] owns one slot in a fixed table and moves through
//! `Idle → Starting → Confirmed → Cooldown → Idle`. Time always comes from
//! frame timestamps, never the wall clock, so replaying the same frames gives
//! the same events.

use crate::core::detectors::CandidateSet;
use crate::core::gesture::GestureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Per-kind confirmation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureState {
    Idle,
    Starting,
    Confirmed,
    Cooldown,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    state: GestureState,
    entered_at: Option<DateTime<Utc>>,
    /// When the candidate became continuously active
    started_at: Option<DateTime<Utc>>,
    /// When the last event for this kind was confirmed
    confirmed_at: Option<DateTime<Utc>>,
}

impl Slot {
    const IDLE: Slot = Slot {
        state: GestureState::Idle,
        entered_at: None,
        started_at: None,
        confirmed_at: None,
    };

    fn enter(&mut self, state: GestureState, now: DateTime<Utc>) {
        self.state = state;
        self.entered_at = Some(now);
    }
}

/// A gesture that won arbitration this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Confirmation {
    pub kind: GestureKind,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
}

/// Point-in-time view of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlotView {
    pub kind: GestureKind,
    pub state: GestureState,
    pub entered_at: Option<DateTime<Utc>>,
}

fn elapsed(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    since
        .and_then(|t| (now - t).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

/// Confirmation/cooldown state for every gesture kind.
///
/// Owned by the processing stage only.
#[derive(Debug, Clone)]
pub struct GestureStateMachine {
    slots: [Slot; GestureKind::COUNT],
    priority: Vec<GestureKind>,
    confirmation: Duration,
    cooldown: Duration,
}

impl GestureStateMachine {
    /// `priority` lists kinds highest first; it is expected to be a complete,
    /// validated order.
    pub fn new(priority: Vec<GestureKind>, confirmation: Duration, cooldown: Duration) -> Self {
        Self {
            slots: [Slot::IDLE; GestureKind::COUNT],
            priority,
            confirmation,
            cooldown,
        }
    }

    pub fn state(&self, kind: GestureKind) -> GestureState {
        self.slots[kind.index()].state
    }

    pub fn snapshot(&self) -> Vec<SlotView> {
        GestureKind::ALL
            .iter()
            .map(|kind| {
                let slot = &self.slots[kind.index()];
                SlotView {
                    kind: *kind,
                    state: slot.state,
                    entered_at: slot.entered_at,
                }
            })
            .collect()
    }

    /// Advance every slot to `now` and return the single confirmed gesture,
    /// if any.
    ///
    /// Time-driven transitions are applied to all slots first. Kinds whose
    /// candidate has then been active for the confirmation duration qualify;
    /// only the highest-priority qualifier is confirmed and the rest stay in
    /// `Starting`.
    pub fn update(&mut self, candidates: &CandidateSet, now: DateTime<Utc>) -> Option<Confirmation> {
        let mut qualified = [false; GestureKind::COUNT];

        for kind in GestureKind::ALL {
            let active = candidates.is_active(kind);
            let slot = &mut self.slots[kind.index()];

            if slot.state == GestureState::Confirmed {
                slot.state = GestureState::Cooldown;
            }
            if slot.state == GestureState::Cooldown {
                if elapsed(slot.confirmed_at, now) < self.cooldown {
                    continue;
                }
                slot.enter(GestureState::Idle, now);
                slot.started_at = None;
            }

            match (slot.state, active) {
                (GestureState::Idle, true) => {
                    slot.enter(GestureState::Starting, now);
                    slot.started_at = Some(now);
                }
                (GestureState::Starting, false) => {
                    slot.enter(GestureState::Idle, now);
                    slot.started_at = None;
                }
                _ => {}
            }

            if slot.state == GestureState::Starting
                && active
                && elapsed(slot.started_at, now) >= self.confirmation
            {
                qualified[kind.index()] = true;
            }
        }

        let winner = self
            .priority
            .iter()
            .copied()
            .find(|kind| qualified[kind.index()])?;

        let slot = &mut self.slots[winner.index()];
        slot.enter(GestureState::Confirmed, now);
        slot.confirmed_at = Some(now);
        slot.started_at = None;

        let pending = qualified.iter().filter(|q| **q).count() - 1;
        if pending > 0 {
            debug!(kind = %winner, pending, "Arbitration deferred lower-priority gestures");
        }

        Some(Confirmation {
            kind: winner,
            timestamp: now,
            confidence: candidates.get(winner).confidence(),
        })
    }

    /// Return every slot to `Idle`, forgetting partial confirmations and
    /// cooldowns.
    pub fn reset(&mut self) {
        self.slots = [Slot::IDLE; GestureKind::COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn machine() -> GestureStateMachine {
        GestureStateMachine::new(
            GestureKind::DEFAULT_PRIORITY.to_vec(),
            Duration::from_millis(100),
            Duration::from_millis(200),
        )
    }

    fn at(t0: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
        t0 + ChronoDuration::milliseconds(ms)
    }

    /// Feed `active` at each listed millisecond offset and collect events.
    fn drive(
        fsm: &mut GestureStateMachine,
        t0: DateTime<Utc>,
        active: &[GestureKind],
        times: impl IntoIterator<Item = i64>,
    ) -> Vec<(i64, GestureKind)> {
        let candidates = CandidateSet::with_active(active);
        times
            .into_iter()
            .filter_map(|ms| fsm.update(&candidates, at(t0, ms)).map(|c| (ms, c.kind)))
            .collect()
    }

    #[test]
    fn test_exact_confirmation_duration_emits_once() {
        for kind in GestureKind::ALL {
            let mut fsm = machine();
            let t0 = Utc::now();
            let events = drive(&mut fsm, t0, &[kind], [0, 50, 100]);
            assert_eq!(events, vec![(100, kind)]);
            assert_eq!(fsm.state(kind), GestureState::Confirmed);
        }
    }

    #[test]
    fn test_drop_before_confirmation_returns_to_idle() {
        let mut fsm = machine();
        let t0 = Utc::now();
        assert!(drive(&mut fsm, t0, &[GestureKind::Squat], [0, 33, 66]).is_empty());
        assert_eq!(fsm.state(GestureKind::Squat), GestureState::Starting);

        assert!(drive(&mut fsm, t0, &[], [99]).is_empty());
        assert_eq!(fsm.state(GestureKind::Squat), GestureState::Idle);

        // No partial credit from the earlier run
        assert!(drive(&mut fsm, t0, &[GestureKind::Squat], [133, 166, 199]).is_empty());
        assert_eq!(drive(&mut fsm, t0, &[GestureKind::Squat], [233]), vec![(233, GestureKind::Squat)]);
    }

    #[test]
    fn test_cooldown_holds_even_when_gesture_is_held() {
        let mut fsm = machine();
        let t0 = Utc::now();
        // 0..=330ms: confirms at 132, cooldown runs to 332
        let times = (0..=10).map(|i| i * 33);
        let events = drive(&mut fsm, t0, &[GestureKind::HandsRaised], times);
        assert_eq!(events, vec![(132, GestureKind::HandsRaised)]);
    }

    #[test]
    fn test_cooldown_elapses_in_full_before_next_event() {
        let mut fsm = machine();
        let t0 = Utc::now();
        let kind = GestureKind::LeanLeft;

        assert_eq!(drive(&mut fsm, t0, &[kind], [0, 100]), vec![(100, kind)]);
        assert!(drive(&mut fsm, t0, &[kind], [150, 250, 299]).is_empty());
        assert_eq!(fsm.state(kind), GestureState::Cooldown);

        // Cooldown ends at 300; the held gesture starts a new confirmation
        assert!(drive(&mut fsm, t0, &[kind], [300]).is_empty());
        assert_eq!(fsm.state(kind), GestureState::Starting);
        assert_eq!(drive(&mut fsm, t0, &[kind], [400]), vec![(400, kind)]);
    }

    #[test]
    fn test_cooldown_ignores_candidate_drop() {
        let mut fsm = machine();
        let t0 = Utc::now();
        let kind = GestureKind::ArmsCrossed;
        drive(&mut fsm, t0, &[kind], [0, 100]);
        drive(&mut fsm, t0, &[], [150]);
        assert_eq!(fsm.state(kind), GestureState::Cooldown);
        drive(&mut fsm, t0, &[], [300]);
        assert_eq!(fsm.state(kind), GestureState::Idle);
    }

    #[test]
    fn test_priority_arbitration_defers_loser() {
        let mut fsm = machine();
        let t0 = Utc::now();
        let both = [GestureKind::LeanLeft, GestureKind::RightPunch];

        let events = drive(&mut fsm, t0, &both, [0, 100]);
        assert_eq!(events, vec![(100, GestureKind::RightPunch)]);
        assert_eq!(fsm.state(GestureKind::LeanLeft), GestureState::Starting);

        // Punch is cooling down, so the lean is uncontested next cycle
        let events = drive(&mut fsm, t0, &both, [133]);
        assert_eq!(events, vec![(133, GestureKind::LeanLeft)]);
    }

    #[test]
    fn test_custom_priority_order() {
        let mut priority = GestureKind::DEFAULT_PRIORITY.to_vec();
        priority.retain(|k| *k != GestureKind::ArmsCrossed);
        priority.insert(0, GestureKind::ArmsCrossed);
        let mut fsm =
            GestureStateMachine::new(priority, Duration::from_millis(100), Duration::from_millis(200));
        let t0 = Utc::now();
        let events = drive(
            &mut fsm,
            t0,
            &[GestureKind::ArmsCrossed, GestureKind::LeftPunch],
            [0, 100],
        );
        assert_eq!(events, vec![(100, GestureKind::ArmsCrossed)]);
    }

    #[test]
    fn test_lean_held_150ms_emits_one_event() {
        let mut fsm = machine();
        let t0 = Utc::now();
        let times = (0..5).map(|i| i * 34);
        let events = drive(&mut fsm, t0, &[GestureKind::LeanLeft], times);
        assert_eq!(events, vec![(102, GestureKind::LeanLeft)]);
    }

    #[test]
    fn test_hands_raised_for_50ms_emits_nothing() {
        let mut fsm = machine();
        let t0 = Utc::now();
        assert!(drive(&mut fsm, t0, &[GestureKind::HandsRaised], [0, 16, 33, 50]).is_empty());
        assert!(drive(&mut fsm, t0, &[], [66, 100, 133]).is_empty());
        assert_eq!(fsm.state(GestureKind::HandsRaised), GestureState::Idle);
    }

    #[test]
    fn test_repeated_timestamp_is_idempotent() {
        let mut fsm = machine();
        let t0 = Utc::now();
        let kind = GestureKind::Squat;
        drive(&mut fsm, t0, &[kind], [0]);
        let events = drive(&mut fsm, t0, &[kind], [100, 100, 100, 100]);
        assert_eq!(events, vec![(100, kind)]);
    }

    #[test]
    fn test_reset_clears_cooldown_and_starting() {
        let mut fsm = machine();
        let t0 = Utc::now();
        drive(&mut fsm, t0, &[GestureKind::Squat], [0, 100]);
        drive(&mut fsm, t0, &[GestureKind::LeanRight], [120]);
        fsm.reset();
        assert!(fsm
            .snapshot()
            .iter()
            .all(|view| view.state == GestureState::Idle));
    }
}
