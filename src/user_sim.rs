// src/user_sim.rs
//
// Goal-conditioned user simulator: a reactive state machine that answers
// agent acts from a sampled goal and decides episode success.
//
// Per-turn state invariants (validated after every handler, fatal on
// violation):
// - rest_slots and history_slots partition the goal's slot keys: disjoint,
//   jointly covering, and every rest key originates from the goal.
// - A `request` response carries at least one request slot; an `inform`
//   response carries at least one inform slot and no request slots.
// - No UNK among staged informs, no PLACEHOLDER among staged requests.

use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::catalog::{Catalog, GoalCorpus};
use crate::config::{DialogueConfig, EnvConfig};
use crate::reward::{reward_for, Outcome};
use crate::types::{
    AgentAct, Frame, Goal, Intent, RecordId, SlotMap, ANYTHING, NO_MATCH, PLACEHOLDER, UNK,
};

/// Internal per-episode simulator state.
///
/// `inform_slots` and `request_slots` stage the response being built this
/// turn; `rest_slots` holds goal slots not yet surfaced, `history_slots`
/// the slots already resolved.
#[derive(Debug, Clone, Default)]
struct SimState {
    intent: Intent,
    inform_slots: SlotMap,
    request_slots: SlotMap,
    rest_slots: SlotMap,
    history_slots: SlotMap,
}

/// Result of one user turn.
#[derive(Debug, Clone)]
pub struct UserStep {
    /// The user's response frame (round stamped later by the tracker).
    pub response: Frame,
    /// Reward for this turn.
    pub reward: f64,
    /// Whether the episode terminated this turn.
    pub done: bool,
    /// Terminal outcome; `NoOutcome` while the episode is live.
    pub outcome: Outcome,
}

pub struct UserSimulator {
    cfg: Arc<DialogueConfig>,
    catalog: Arc<Catalog>,
    corpus: Arc<GoalCorpus>,
    max_round: u32,
    goal: Goal,
    state: SimState,
    constraint_check: Outcome,
}

impl UserSimulator {
    pub fn new(
        cfg: Arc<DialogueConfig>,
        env_cfg: &EnvConfig,
        corpus: Arc<GoalCorpus>,
        catalog: Arc<Catalog>,
    ) -> Self {
        UserSimulator {
            cfg,
            catalog,
            corpus,
            max_round: env_cfg.max_round_num,
            goal: Goal::default(),
            state: SimState::default(),
            constraint_check: Outcome::Fail,
        }
    }

    /// Sample a fresh goal and return the user's opening frame.
    pub fn reset(&mut self, rng: &mut ChaCha8Rng) -> Frame {
        self.goal = self.corpus.sample(rng);
        // Default-key bookkeeping: the sampled goal always requests the
        // default key, whether or not the corpus entry listed it.
        self.goal
            .request_slots
            .insert(self.cfg.default_key.clone(), UNK.to_string());

        self.state = SimState::default();
        self.state.rest_slots.extend(
            self.goal
                .inform_slots
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.state.rest_slots.extend(
            self.goal
                .request_slots
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        self.constraint_check = Outcome::Fail;

        let frame = self.init_action(rng);
        self.check_turn_invariants();
        frame
    }

    /// Build the opening `request` frame: required-init informs (or one
    /// random goal inform), plus a single request slot.
    fn init_action(&mut self, rng: &mut ChaCha8Rng) -> Frame {
        self.state.intent = Intent::Request;

        if !self.goal.inform_slots.is_empty() {
            let required: Vec<String> = self.cfg.required_init_inform_keys.clone();
            for key in required {
                if let Some(value) = self.goal.inform_slots.get(&key).cloned() {
                    self.state.inform_slots.insert(key.clone(), value.clone());
                    self.state.rest_slots.remove(&key);
                    self.state.history_slots.insert(key, value);
                }
            }
            if self.state.inform_slots.is_empty() {
                let items: Vec<(String, String)> = self
                    .goal
                    .inform_slots
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let (key, value) = items[rng.gen_range(0..items.len())].clone();
                self.state.inform_slots.insert(key.clone(), value.clone());
                self.state.rest_slots.remove(&key);
                self.state.history_slots.insert(key, value);
            }
        }

        // Pick one request slot among the goal's own requests, excluding
        // the default key; fall back to the default key if none remain.
        // The default key is re-added to the goal's request set afterward.
        let default_key = self.cfg.default_key.clone();
        self.goal.request_slots.remove(&default_key);
        let request_key = if self.goal.request_slots.is_empty() {
            default_key.clone()
        } else {
            let keys: Vec<String> = self.goal.request_slots.keys().cloned().collect();
            keys[rng.gen_range(0..keys.len())].clone()
        };
        self.goal
            .request_slots
            .insert(default_key, UNK.to_string());
        self.state.request_slots.clear();
        self.state
            .request_slots
            .insert(request_key, UNK.to_string());

        Frame::user(
            Intent::Request,
            self.state.inform_slots.clone(),
            &self.state.request_slots,
        )
    }

    /// Respond to a finalized agent frame.
    pub fn step(&mut self, agent_frame: &Frame, rng: &mut ChaCha8Rng) -> UserStep {
        Self::validate_agent_frame(agent_frame);

        self.state.inform_slots.clear();

        let mut done = false;
        let mut outcome = Outcome::NoOutcome;

        if agent_frame.round == self.max_round {
            done = true;
            outcome = Outcome::Fail;
            self.state.intent = Intent::Done;
            self.state.request_slots.clear();
        } else {
            match AgentAct::from_frame(agent_frame) {
                AgentAct::Request { slot } => self.response_to_request(&slot, rng),
                AgentAct::Inform { slot, value } => {
                    self.response_to_inform(&slot, &value, rng)
                }
                AgentAct::MatchFound { informs } => self.response_to_match_found(&informs),
                AgentAct::Done => {
                    outcome = self.evaluate_success();
                    done = true;
                    self.state.intent = Intent::Done;
                    self.state.request_slots.clear();
                }
            }
        }

        self.check_turn_invariants();

        let response = Frame::user(
            self.state.intent,
            self.state.inform_slots.clone(),
            &self.state.request_slots,
        );
        UserStep {
            response,
            reward: reward_for(outcome, self.max_round),
            done,
            outcome,
        }
    }

    /// Agent asked for `slot`. Four ordered cases; first match wins.
    fn response_to_request(&mut self, slot: &str, rng: &mut ChaCha8Rng) {
        if let Some(value) = self.goal.inform_slots.get(slot).cloned() {
            // (1) Known from the goal's own constraints: answer it.
            self.state.intent = Intent::Inform;
            self.state.inform_slots.insert(slot.to_string(), value.clone());
            self.state.request_slots.clear();
            self.state.rest_slots.remove(slot);
            self.state.history_slots.insert(slot.to_string(), value);
        } else if self.goal.request_slots.contains_key(slot)
            && self.state.history_slots.contains_key(slot)
        {
            // (2) Previously answered: repeat the historical value.
            assert!(
                !self.state.rest_slots.contains_key(slot),
                "slot '{}' is in history and still in rest",
                slot
            );
            let value = self.state.history_slots[slot].clone();
            self.state.intent = Intent::Inform;
            self.state.inform_slots.insert(slot.to_string(), value);
            self.state.request_slots.clear();
        } else if self.goal.request_slots.contains_key(slot)
            && self.state.rest_slots.contains_key(slot)
        {
            // (3) The user wants this answered too: request it back and
            // proactively inform one other pending constraint.
            self.state.request_slots.clear();
            self.state.intent = Intent::Request;
            self.state
                .request_slots
                .insert(slot.to_string(), UNK.to_string());

            let rest_informs: Vec<(String, String)> = self
                .state
                .rest_slots
                .iter()
                .filter(|(_, v)| v.as_str() != UNK)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if !rest_informs.is_empty() {
                let (key, value) = rest_informs[rng.gen_range(0..rest_informs.len())].clone();
                self.state.inform_slots.insert(key.clone(), value.clone());
                self.state.rest_slots.remove(&key);
                self.state.history_slots.insert(key, value);
            }
        } else {
            // (4) Genuinely indifferent: anything works.
            self.state.intent = Intent::Inform;
            self.state
                .inform_slots
                .insert(slot.to_string(), ANYTHING.to_string());
            self.state.request_slots.clear();
            self.state
                .history_slots
                .insert(slot.to_string(), ANYTHING.to_string());
        }
    }

    /// Agent informed `slot = value`. Record it, correct contradictions,
    /// then pick the next move.
    fn response_to_inform(&mut self, slot: &str, value: &str, rng: &mut ChaCha8Rng) {
        assert!(
            slot != self.cfg.default_key,
            "agent must propose the default key via match_found, not inform"
        );

        self.state
            .history_slots
            .insert(slot.to_string(), value.to_string());
        self.state.rest_slots.remove(slot);
        self.state.request_slots.remove(slot);

        let goal_value = self.goal.inform_slots.get(slot).cloned();
        if let Some(goal_value) = goal_value.filter(|gv| gv.as_str() != value) {
            // Contradiction: override with the goal's own value.
            self.state.intent = Intent::Inform;
            self.state
                .inform_slots
                .insert(slot.to_string(), goal_value.clone());
            self.state.request_slots.clear();
            self.state
                .history_slots
                .insert(slot.to_string(), goal_value);
            return;
        }

        if !self.state.request_slots.is_empty() {
            // Still waiting on an answer: re-assert the request.
            self.state.intent = Intent::Request;
        } else if !self.state.rest_slots.is_empty() {
            let default_key = self.cfg.default_key.clone();
            // The default key is surfaced last; hold it aside while
            // choosing among the remaining rest slots.
            let held_default = self.state.rest_slots.remove(&default_key);
            if self.state.rest_slots.is_empty() {
                self.state.intent = Intent::Request;
                self.state
                    .request_slots
                    .insert(default_key.clone(), UNK.to_string());
            } else {
                let items: Vec<(String, String)> = self
                    .state
                    .rest_slots
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let (key, rest_value) = items[rng.gen_range(0..items.len())].clone();
                if rest_value == UNK {
                    self.state.intent = Intent::Request;
                    self.state.request_slots.insert(key, UNK.to_string());
                } else {
                    self.state.intent = Intent::Inform;
                    self.state
                        .inform_slots
                        .insert(key.clone(), rest_value.clone());
                    self.state.rest_slots.remove(&key);
                    self.state.history_slots.insert(key, rest_value);
                }
            }
            if held_default.as_deref() == Some(UNK) {
                self.state
                    .rest_slots
                    .insert(default_key, UNK.to_string());
            }
        } else {
            self.state.intent = Intent::Ok;
        }
    }

    /// Agent proposed a candidate record. Verify it against every goal
    /// constraint outside the no-query set; strict equality only.
    fn response_to_match_found(&mut self, informs: &SlotMap) {
        let default_key = self.cfg.default_key.clone();
        let proposed = informs
            .get(&default_key)
            .unwrap_or_else(|| {
                panic!("match_found frame missing default key '{}'", default_key)
            })
            .clone();

        self.state.intent = Intent::Ok;
        self.constraint_check = Outcome::Success;

        self.state.rest_slots.remove(&default_key);
        self.state
            .history_slots
            .insert(default_key.clone(), proposed.clone());
        self.state.request_slots.remove(&default_key);

        if proposed == NO_MATCH {
            self.constraint_check = Outcome::Fail;
        } else {
            for (slot, value) in &self.goal.inform_slots {
                if self.cfg.no_query_slots.contains(slot) {
                    continue;
                }
                if informs.get(slot) != Some(value) {
                    self.constraint_check = Outcome::Fail;
                    break;
                }
            }
        }

        if self.constraint_check == Outcome::Fail {
            self.state.intent = Intent::Reject;
            self.state.request_slots.clear();
        }
    }

    /// Terminal evaluation when the agent closes the conversation.
    fn evaluate_success(&self) -> Outcome {
        if self.constraint_check == Outcome::Fail {
            return Outcome::Fail;
        }
        if !self.state.rest_slots.is_empty() {
            return Outcome::Fail;
        }
        assert!(
            self.state.request_slots.is_empty(),
            "rest slots empty but requests still pending: {:?}",
            self.state.request_slots
        );

        // Re-verify the accepted record. A mismatch here means an upstream
        // invariant was already broken; it is a bug, never a valid FAIL.
        let default_key = &self.cfg.default_key;
        let stored = self
            .state
            .history_slots
            .get(default_key)
            .unwrap_or_else(|| panic!("constraint check passed without a stored match"));
        let id: RecordId = stored
            .parse()
            .unwrap_or_else(|_| panic!("stored match '{}' is not a record id", stored));
        let record = self
            .catalog
            .get(id)
            .unwrap_or_else(|| panic!("stored match id {} is not in the catalog", id));
        for (slot, value) in &self.goal.inform_slots {
            if self.cfg.no_query_slots.contains(slot) {
                continue;
            }
            assert!(
                record.get(slot) == Some(value),
                "accepted record {} violates goal constraint {}={}",
                id,
                slot,
                value
            );
        }

        Outcome::Success
    }

    /// A finalized agent frame may not carry UNK informs or PLACEHOLDER
    /// anywhere. Violation is a wiring bug, not a runtime condition.
    fn validate_agent_frame(frame: &Frame) {
        assert!(
            !frame.informs_contain(UNK),
            "agent frame carries UNK inform: {:?}",
            frame
        );
        assert!(
            !frame.informs_contain(PLACEHOLDER) && !frame.requests_contain(PLACEHOLDER),
            "agent frame carries unfilled PLACEHOLDER: {:?}",
            frame
        );
    }

    fn check_turn_invariants(&self) {
        match self.state.intent {
            Intent::Request => assert!(
                !self.state.request_slots.is_empty(),
                "request response with no request slots"
            ),
            Intent::Inform => {
                assert!(
                    !self.state.inform_slots.is_empty(),
                    "inform response with no inform slots"
                );
                assert!(
                    self.state.request_slots.is_empty(),
                    "inform response with pending request slots"
                );
            }
            _ => {}
        }
        assert!(
            !self.state.inform_slots.values().any(|v| v == UNK),
            "UNK among staged informs"
        );
        assert!(
            !self.state.request_slots.values().any(|v| v == PLACEHOLDER),
            "PLACEHOLDER among staged requests"
        );

        for key in self.state.rest_slots.keys() {
            assert!(
                !self.state.history_slots.contains_key(key),
                "slot '{}' present in both rest and history",
                key
            );
            assert!(
                self.goal.inform_slots.contains_key(key)
                    || self.goal.request_slots.contains_key(key),
                "rest slot '{}' does not originate from the goal",
                key
            );
        }
        for key in self
            .goal
            .inform_slots
            .keys()
            .chain(self.goal.request_slots.keys())
        {
            assert!(
                self.state.rest_slots.contains_key(key)
                    || self.state.history_slots.contains_key(key),
                "goal slot '{}' lost from both rest and history",
                key
            );
        }
    }

    // ----- Introspection (tests and the research harness) -----

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn rest_slots(&self) -> &SlotMap {
        &self.state.rest_slots
    }

    pub fn history_slots(&self) -> &SlotMap {
        &self.state.history_slots
    }

    pub fn constraint_check(&self) -> Outcome {
        self.constraint_check
    }

    pub fn max_round(&self) -> u32 {
        self.max_round
    }
}
