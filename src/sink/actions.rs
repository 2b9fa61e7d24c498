//! Gesture to action id mapping.

use crate::core::gesture::GestureKind;
use std::collections::BTreeMap;

/// Table from gesture kind to the action id a sink should perform.
///
/// Kinds missing from the table are still detected and debounced but never
/// reach the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMap {
    actions: BTreeMap<GestureKind, String>,
}

impl Default for ActionMap {
    fn default() -> Self {
        Self {
            actions: GestureKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_action().to_string()))
                .collect(),
        }
    }
}

impl ActionMap {
    /// A map with no actions.
    pub fn empty() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    /// Build from the configured key mapping.
    pub fn from_mapping(mapping: &BTreeMap<GestureKind, String>) -> Self {
        Self {
            actions: mapping.clone(),
        }
    }

    pub fn with(mut self, kind: GestureKind, action: impl Into<String>) -> Self {
        self.actions.insert(kind, action.into());
        self
    }

    pub fn without(mut self, kind: GestureKind) -> Self {
        self.actions.remove(&kind);
        self
    }

    pub fn action_for(&self, kind: GestureKind) -> Option<&str> {
        self.actions.get(&kind).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GestureKind, &str)> {
        self.actions.iter().map(|(k, v)| (*k, v.as_str()))
    }
}
