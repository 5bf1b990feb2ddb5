// src/policy.rs
//
// The policy contract and the feasible agent action space.
//
// Policies see only the tracker's observation and answer with an action
// index plus the corresponding frame template. Inform templates carry
// PLACEHOLDER values; the tracker fills them before the frame reaches
// the user simulator.

use std::sync::Arc;

use crate::config::DialogueConfig;
use crate::tracker::DialogueObservation;
use crate::types::{Frame, Intent, SlotMap, PLACEHOLDER, UNK};

/// Ordered catalog of feasible agent actions.
///
/// Index layout: 0 `done`, 1 `match_found`, then one `inform(slot)` per
/// agent-informable slot excluding the default key, then one
/// `request(slot)` per agent-requestable slot.
#[derive(Debug, Clone)]
pub struct ActionSpace {
    actions: Vec<Frame>,
}

impl ActionSpace {
    pub fn new(cfg: &DialogueConfig) -> Self {
        let mut actions = Vec::new();
        actions.push(Frame::agent(Intent::Done, SlotMap::new(), SlotMap::new()));
        actions.push(Frame::agent(
            Intent::MatchFound,
            SlotMap::new(),
            SlotMap::new(),
        ));
        for slot in &cfg.agent_inform_slots {
            if slot == &cfg.default_key {
                continue;
            }
            let informs: SlotMap = [(slot.clone(), PLACEHOLDER.to_string())]
                .into_iter()
                .collect();
            actions.push(Frame::agent(Intent::Inform, informs, SlotMap::new()));
        }
        for slot in &cfg.agent_request_slots {
            let requests: SlotMap = [(slot.clone(), UNK.to_string())].into_iter().collect();
            actions.push(Frame::agent(Intent::Request, SlotMap::new(), requests));
        }
        ActionSpace { actions }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Fresh copy of the template at `index`. Panics on an out-of-range
    /// index: that is a policy bug, not a runtime condition.
    pub fn frame(&self, index: usize) -> Frame {
        self.actions
            .get(index)
            .unwrap_or_else(|| panic!("action index {} out of range", index))
            .clone()
    }

    /// Index of the `request(slot)` action.
    pub fn request_index(&self, slot: &str) -> Option<usize> {
        self.actions.iter().position(|frame| {
            frame.intent == Intent::Request && frame.request_slots.contains_key(slot)
        })
    }

    /// Index of the `inform(slot)` action.
    pub fn inform_index(&self, slot: &str) -> Option<usize> {
        self.actions.iter().position(|frame| {
            frame.intent == Intent::Inform && frame.inform_slots.contains_key(slot)
        })
    }

    pub fn done_index(&self) -> usize {
        0
    }

    pub fn match_found_index(&self) -> usize {
        1
    }
}

/// An agent policy: observation in, `(action_index, frame)` out.
///
/// The returned frame must stamp `round` from the observation; the
/// environment asserts this on receipt.
pub trait Policy {
    fn act(&mut self, observation: &DialogueObservation) -> (usize, Frame);

    /// Called at every episode boundary.
    fn reset(&mut self) {}
}

/// Deterministic rule-based policy: request each slot from the configured
/// rule-request list in order, then propose a match, then close.
///
/// Stands in for a learned policy in the harness and the tests.
pub struct RulePolicy {
    cfg: Arc<DialogueConfig>,
    space: ActionSpace,
    next_request: usize,
    proposed: bool,
}

impl RulePolicy {
    pub fn new(cfg: Arc<DialogueConfig>) -> Self {
        let space = ActionSpace::new(&cfg);
        RulePolicy {
            cfg,
            space,
            next_request: 0,
            proposed: false,
        }
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.space
    }
}

impl Policy for RulePolicy {
    fn act(&mut self, observation: &DialogueObservation) -> (usize, Frame) {
        let index = if self.next_request < self.cfg.rule_requests.len() {
            let slot = &self.cfg.rule_requests[self.next_request];
            self.next_request += 1;
            self.space
                .request_index(slot)
                .unwrap_or_else(|| panic!("rule request slot '{}' has no action", slot))
        } else if !self.proposed {
            self.proposed = true;
            self.space.match_found_index()
        } else {
            self.space.done_index()
        };

        let mut frame = self.space.frame(index);
        frame.round = observation.round;
        (index, frame)
    }

    fn reset(&mut self) {
        self.next_request = 0;
        self.proposed = false;
    }
}
