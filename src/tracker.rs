// src/tracker.rs
//
// Dialogue state tracker: owns the round counter, folds agent and user
// frames into a running snapshot, fills agent frame templates against the
// matcher, and encodes the policy-facing observation.
//
// Frames fold in strict alternation, agent then user. The tracker stamps
// rounds: the user frame takes the current round and advances the counter,
// the agent frame takes the counter as-is, so the first agent frame after
// reset carries round 1.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{DialogueConfig, EnvConfig};
use crate::matcher::ConstraintMatcher;
use crate::types::{Frame, Intent, SlotMap, Speaker, NO_MATCH, PLACEHOLDER};

/// Observation schema version, bumped on any change to the structured
/// fields or the feature vector layout.
pub const OBS_VERSION: u32 = 1;

/// Immutable policy-facing snapshot of the dialogue state.
///
/// Structured fields carry the raw state; `features` is the flat numeric
/// encoding (layout documented on [`StateTracker::encode_features`]).
/// All collections are ordered, so serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueObservation {
    pub version: u32,
    pub round: u32,
    pub done: bool,
    pub user_intent: Intent,
    pub user_inform_slots: Vec<String>,
    pub user_request_slots: Vec<String>,
    pub agent_intent: Option<Intent>,
    pub agent_inform_slots: Vec<String>,
    pub agent_request_slots: Vec<String>,
    /// Constraints accumulated across the episode so far.
    pub current_informs: SlotMap,
    /// Records matching the current queryable constraints.
    pub match_count: usize,
    pub features: Vec<f64>,
}

impl DialogueObservation {
    /// Canonical JSON form, byte-identical for equal observations.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).expect("observation serializes to JSON")
    }
}

pub struct StateTracker {
    cfg: Arc<DialogueConfig>,
    matcher: Arc<ConstraintMatcher>,
    max_round: u32,
    round_num: u32,
    current_informs: SlotMap,
    last_user_frame: Option<Frame>,
    last_agent_frame: Option<Frame>,
    history: Vec<Frame>,
}

impl StateTracker {
    pub fn new(
        cfg: Arc<DialogueConfig>,
        env_cfg: &EnvConfig,
        matcher: Arc<ConstraintMatcher>,
    ) -> Self {
        StateTracker {
            cfg,
            matcher,
            max_round: env_cfg.max_round_num,
            round_num: 0,
            current_informs: SlotMap::new(),
            last_user_frame: None,
            last_agent_frame: None,
            history: Vec::new(),
        }
    }

    /// Clear all accumulated state and zero the round counter.
    pub fn reset(&mut self) {
        self.round_num = 0;
        self.current_informs.clear();
        self.last_user_frame = None;
        self.last_agent_frame = None;
        self.history.clear();
    }

    /// Fold a user frame into the snapshot. Stamps the current round onto
    /// the frame, then advances the counter.
    pub fn update_state_user(&mut self, frame: &mut Frame) {
        debug_assert_eq!(frame.speaker, Speaker::User);
        for (slot, value) in &frame.inform_slots {
            self.current_informs.insert(slot.clone(), value.clone());
        }
        frame.round = self.round_num;
        self.round_num += 1;
        self.last_user_frame = Some(frame.clone());
        self.history.push(frame.clone());
    }

    /// Fold an agent frame into the snapshot, filling templates first:
    /// PLACEHOLDER informs resolve against the matcher, and a
    /// `match_found` frame is rewritten to carry a concrete matching
    /// record (or the "no match available" sentinel). Stamps the current
    /// round without advancing it.
    pub fn update_state_agent(&mut self, frame: &mut Frame) {
        debug_assert_eq!(frame.speaker, Speaker::Agent);
        match frame.intent {
            Intent::Inform => {
                assert!(
                    !frame.inform_slots.is_empty(),
                    "agent inform frame carries no inform slot"
                );
                let fills: Vec<(String, String)> = frame
                    .inform_slots
                    .iter()
                    .filter(|(_, value)| value.as_str() == PLACEHOLDER)
                    .map(|(slot, _)| {
                        (
                            slot.clone(),
                            self.matcher.fill_inform_value(slot, &self.current_informs),
                        )
                    })
                    .collect();
                for (slot, value) in fills {
                    frame.inform_slots.insert(slot, value);
                }
                for (slot, value) in &frame.inform_slots {
                    assert!(
                        slot != &self.cfg.default_key,
                        "agent must propose the default key via match_found"
                    );
                    self.current_informs.insert(slot.clone(), value.clone());
                }
            }
            Intent::MatchFound => {
                let constraints = self.matcher.queryable_constraints(&self.current_informs);
                let results = self.matcher.query(&constraints);
                let default_key = self.cfg.default_key.clone();
                if let Some((id, record)) = results.iter().next() {
                    frame.inform_slots = record.clone();
                    frame
                        .inform_slots
                        .insert(default_key.clone(), id.to_string());
                } else {
                    frame
                        .inform_slots
                        .insert(default_key.clone(), NO_MATCH.to_string());
                }
                let proposed = frame.inform_slots[&default_key].clone();
                self.current_informs.insert(default_key, proposed);
            }
            Intent::Request | Intent::Done => {}
            Intent::Ok | Intent::Reject => {
                panic!("agent frame carries user-only intent {:?}", frame.intent)
            }
        }
        frame.round = self.round_num;
        self.last_agent_frame = Some(frame.clone());
        self.history.push(frame.clone());
    }

    /// Immutable snapshot for the policy.
    ///
    /// Panics if called before the first user frame: the environment
    /// always observes after `reset`.
    pub fn get_state(&self, done: bool) -> DialogueObservation {
        let user = self
            .last_user_frame
            .as_ref()
            .unwrap_or_else(|| panic!("get_state called before the opening user frame"));
        let agent = self.last_agent_frame.as_ref();

        let constraints = self.matcher.queryable_constraints(&self.current_informs);
        let match_count = self.matcher.match_count(&constraints);

        DialogueObservation {
            version: OBS_VERSION,
            round: self.round_num,
            done,
            user_intent: user.intent,
            user_inform_slots: user.inform_slots.keys().cloned().collect(),
            user_request_slots: user.request_slots.keys().cloned().collect(),
            agent_intent: agent.map(|f| f.intent),
            agent_inform_slots: agent
                .map(|f| f.inform_slots.keys().cloned().collect())
                .unwrap_or_default(),
            agent_request_slots: agent
                .map(|f| f.request_slots.keys().cloned().collect())
                .unwrap_or_default(),
            current_informs: self.current_informs.clone(),
            match_count,
            features: self.encode_features(user, agent, match_count, done),
        }
    }

    /// Flat feature encoding, in order:
    /// - user intent one-hot over `all_intents`
    /// - user inform / user request multi-hot over `all_slots`
    /// - agent intent one-hot over `all_intents` (all zero before the
    ///   first agent turn)
    /// - agent inform / agent request multi-hot over `all_slots`
    /// - cumulative inform multi-hot over `all_slots`
    /// - per-slot single-constraint match indicator over `all_slots`
    /// - round scaled by the ceiling, done flag, match count scaled by
    ///   catalog size, any-match flag
    fn encode_features(
        &self,
        user: &Frame,
        agent: Option<&Frame>,
        match_count: usize,
        done: bool,
    ) -> Vec<f64> {
        let mut features = Vec::new();

        self.push_intent_one_hot(&mut features, Some(user.intent));
        self.push_slot_multi_hot(&mut features, &user.inform_slots);
        self.push_slot_multi_hot(&mut features, &user.request_slots);

        self.push_intent_one_hot(&mut features, agent.map(|f| f.intent));
        let empty = SlotMap::new();
        self.push_slot_multi_hot(&mut features, agent.map(|f| &f.inform_slots).unwrap_or(&empty));
        self.push_slot_multi_hot(&mut features, agent.map(|f| &f.request_slots).unwrap_or(&empty));

        self.push_slot_multi_hot(&mut features, &self.current_informs);

        // Per-constraint viability: does each accumulated constraint, on
        // its own, still match at least one record?
        let queryable = self.matcher.queryable_constraints(&self.current_informs);
        for slot in &self.cfg.all_slots {
            let hit = match queryable.get(slot) {
                Some(value) => {
                    let single: SlotMap =
                        [(slot.clone(), value.clone())].into_iter().collect();
                    self.matcher.match_count(&single) > 0
                }
                None => false,
            };
            features.push(if hit { 1.0 } else { 0.0 });
        }

        features.push(self.round_num as f64 / self.max_round as f64);
        features.push(if done { 1.0 } else { 0.0 });
        let catalog_len = self.matcher.catalog().len();
        features.push(match_count as f64 / catalog_len as f64);
        features.push(if match_count > 0 { 1.0 } else { 0.0 });

        features
    }

    fn push_intent_one_hot(&self, features: &mut Vec<f64>, intent: Option<Intent>) {
        for candidate in &self.cfg.all_intents {
            features.push(if Some(*candidate) == intent { 1.0 } else { 0.0 });
        }
    }

    fn push_slot_multi_hot(&self, features: &mut Vec<f64>, slots: &SlotMap) {
        for slot in &self.cfg.all_slots {
            features.push(if slots.contains_key(slot) { 1.0 } else { 0.0 });
        }
    }

    // ----- Introspection -----

    pub fn round_num(&self) -> u32 {
        self.round_num
    }

    pub fn current_informs(&self) -> &SlotMap {
        &self.current_informs
    }

    /// Every frame folded so far, in order, with stamped rounds.
    pub fn history(&self) -> &[Frame] {
        &self.history
    }
}
