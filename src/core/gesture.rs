//! Gesture kinds and the control events emitted for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of gestures the pipeline recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    LeanLeft,
    LeanRight,
    HandsRaised,
    Squat,
    RightPunch,
    LeftPunch,
    ArmsCrossed,
}

impl GestureKind {
    /// Number of gesture kinds.
    pub const COUNT: usize = 7;

    /// Every kind, in table order.
    pub const ALL: [GestureKind; GestureKind::COUNT] = [
        GestureKind::LeanLeft,
        GestureKind::LeanRight,
        GestureKind::HandsRaised,
        GestureKind::Squat,
        GestureKind::RightPunch,
        GestureKind::LeftPunch,
        GestureKind::ArmsCrossed,
    ];

    /// Default arbitration order, highest priority first.
    pub const DEFAULT_PRIORITY: [GestureKind; GestureKind::COUNT] = [
        GestureKind::RightPunch,
        GestureKind::LeftPunch,
        GestureKind::LeanLeft,
        GestureKind::LeanRight,
        GestureKind::Squat,
        GestureKind::HandsRaised,
        GestureKind::ArmsCrossed,
    ];

    /// Slot of this kind in fixed-size per-kind tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Default action id for this kind.
    pub fn default_action(self) -> &'static str {
        match self {
            GestureKind::LeanLeft => "a",
            GestureKind::LeanRight => "d",
            GestureKind::HandsRaised => "w",
            GestureKind::Squat => "s",
            GestureKind::RightPunch => "j",
            GestureKind::LeftPunch => "k",
            GestureKind::ArmsCrossed => "l",
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GestureKind::LeanLeft => "lean_left",
            GestureKind::LeanRight => "lean_right",
            GestureKind::HandsRaised => "hands_raised",
            GestureKind::Squat => "squat",
            GestureKind::RightPunch => "right_punch",
            GestureKind::LeftPunch => "left_punch",
            GestureKind::ArmsCrossed => "arms_crossed",
        };
        f.pad(name)
    }
}

/// A confirmed, debounced gesture mapped to an output action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlEvent {
    /// Which gesture was confirmed
    pub kind: GestureKind,
    /// Target action id from the injected action map
    pub action: String,
    /// Timestamp of the frame that confirmed the gesture
    pub timestamp: DateTime<Utc>,
    /// Detector confidence at confirmation, in `[0, 1]`
    pub confidence: f64,
    /// Emission order within the session
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_table_order() {
        for (i, kind) in GestureKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_default_priority_covers_every_kind() {
        let mut sorted = GestureKind::DEFAULT_PRIORITY.to_vec();
        sorted.sort();
        assert_eq!(sorted, GestureKind::ALL.to_vec());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&GestureKind::RightPunch).unwrap();
        assert_eq!(json, "\"right_punch\"");
        let kind: GestureKind = serde_json::from_str("\"arms_crossed\"").unwrap();
        assert_eq!(kind, GestureKind::ArmsCrossed);
    }
}
