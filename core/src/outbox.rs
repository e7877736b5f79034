use offgrid_proto::{AttemptId, EnqueuedEffect, IdsMap};
use std::collections::VecDeque;
use tracing::warn;

use crate::{action_debug, ids};

/// Pending mutations, oldest first. The head is the only entry that is ever in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outbox {
    effects: VecDeque<EnqueuedEffect>,
}

impl Outbox {
    pub fn new() -> Self { Self::default() }

    pub fn from_effects(effects: Vec<EnqueuedEffect>) -> Self { Self { effects: effects.into() } }

    pub fn enqueue(&mut self, effect: EnqueuedEffect) {
        action_debug!(self, "enqueue", "{}", &effect);
        self.effects.push_back(effect);
    }

    pub fn head(&self) -> Option<&EnqueuedEffect> { self.effects.front() }

    /// Everything behind the head.
    pub fn remaining(&self) -> impl Iterator<Item = &EnqueuedEffect> { self.effects.iter().skip(1) }

    pub fn iter(&self) -> impl Iterator<Item = &EnqueuedEffect> { self.effects.iter() }

    pub fn len(&self) -> usize { self.effects.len() }

    pub fn is_empty(&self) -> bool { self.effects.is_empty() }

    pub fn contains(&self, attempt_id: &AttemptId) -> bool { self.effects.iter().any(|e| &e.attempt_id == attempt_id) }

    /// Retire the head after its replay succeeded.
    pub fn commit(&mut self, attempt_id: &AttemptId) -> Option<EnqueuedEffect> { self.retire("commit", attempt_id) }

    /// Retire the head after its replay was discarded.
    pub fn rollback(&mut self, attempt_id: &AttemptId) -> Option<EnqueuedEffect> { self.retire("rollback", attempt_id) }

    fn retire(&mut self, action: &str, attempt_id: &AttemptId) -> Option<EnqueuedEffect> {
        match self.effects.front() {
            Some(head) if &head.attempt_id == attempt_id => {
                let effect = self.effects.pop_front();
                action_debug!(self, action, "{}", attempt_id);
                effect
            }
            Some(head) => {
                warn!("Outbox {action} for {attempt_id} ignored, head is {}", head.attempt_id);
                None
            }
            None => {
                warn!("Outbox {action} for {attempt_id} ignored, outbox is empty");
                None
            }
        }
    }

    /// Rewrite every queued effect's variables and optimistic response through the identifier map.
    pub fn substitute_ids(&mut self, ids_map: &IdsMap) {
        for effect in self.effects.iter_mut() {
            effect.operation.variables = ids::substitute(&effect.operation.variables, ids_map);
            if let Some(optimistic) = &effect.optimistic_response {
                effect.optimistic_response = Some(ids::substitute(optimistic, ids_map));
            }
        }
    }

    pub fn clear(&mut self) { self.effects.clear() }

    pub fn to_vec(&self) -> Vec<EnqueuedEffect> { self.effects.iter().cloned().collect() }
}

impl std::fmt::Display for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Outbox({})", self.effects.len()) }
}
