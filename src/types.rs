// src/types.rs
//
// Shared wire types for the dialogue environment: intents, speakers,
// the semantic frame exchanged every turn, and the typed agent-act view
// the user simulator dispatches on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel value for a requested-but-unanswered slot.
pub const UNK: &str = "UNK";

/// Sentinel value for an agent inform template not yet filled by the
/// state tracker. Must never cross into the user simulator.
pub const PLACEHOLDER: &str = "PLACEHOLDER";

/// Sentinel inform value meaning "any value works for this slot".
pub const ANYTHING: &str = "anything";

/// Sentinel informed for the default key when no catalog record satisfies
/// the current constraints. A valid business result, not an error.
pub const NO_MATCH: &str = "no match available";

/// Catalog record identifier.
pub type RecordId = u64;

/// Ordered slot -> value mapping.
///
/// BTreeMap keeps iteration deterministic, which matters for seeded
/// reproducibility and for the frozen cache keys in the matcher.
pub type SlotMap = BTreeMap<String, String>;

/// Dialogue act intent. `MatchFound` is agent-only; `Ok` and `Reject`
/// are user-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Inform,
    Request,
    Ok,
    Reject,
    Done,
    MatchFound,
}

impl Intent {
    /// Stable lowercase name (used in logs and feature encoding).
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Inform => "inform",
            Intent::Request => "request",
            Intent::Ok => "ok",
            Intent::Reject => "reject",
            Intent::Done => "done",
            Intent::MatchFound => "match_found",
        }
    }
}

impl Default for Intent {
    fn default() -> Self {
        Intent::Request
    }
}

/// Which side of the conversation produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Agent,
}

/// The semantic frame exchanged every turn.
///
/// Request slot values are always the `UNK` sentinel. A finalized frame
/// crossing into the user simulator never carries `PLACEHOLDER`, and a
/// user-produced frame never carries `UNK` among its informs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub intent: Intent,
    pub inform_slots: SlotMap,
    pub request_slots: SlotMap,
    pub round: u32,
    pub speaker: Speaker,
}

impl Frame {
    /// Build a user frame. Request slot values are forced to `UNK`.
    /// The round is stamped later by the state tracker.
    pub fn user(intent: Intent, inform_slots: SlotMap, request_keys: &SlotMap) -> Self {
        let mut request_slots = SlotMap::new();
        for key in request_keys.keys() {
            request_slots.insert(key.clone(), UNK.to_string());
        }
        Frame {
            intent,
            inform_slots,
            request_slots,
            round: 0,
            speaker: Speaker::User,
        }
    }

    /// Build an agent frame template.
    pub fn agent(intent: Intent, inform_slots: SlotMap, request_slots: SlotMap) -> Self {
        Frame {
            intent,
            inform_slots,
            request_slots,
            round: 0,
            speaker: Speaker::Agent,
        }
    }

    /// True if any inform value equals the given sentinel.
    pub fn informs_contain(&self, sentinel: &str) -> bool {
        self.inform_slots.values().any(|v| v == sentinel)
    }

    /// True if any request value equals the given sentinel.
    pub fn requests_contain(&self, sentinel: &str) -> bool {
        self.request_slots.values().any(|v| v == sentinel)
    }
}

/// Typed view of a finalized agent frame, giving exhaustiveness-checked
/// dispatch in the user simulator instead of ad-hoc key lookups.
///
/// Parsing panics on missing required fields or user-only intents: those
/// indicate a bug in the driving policy or the environment wiring, never
/// a recoverable runtime condition.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAct {
    /// Agent asks the user for one slot.
    Request { slot: String },
    /// Agent informs one slot value (already filled by the tracker).
    Inform { slot: String, value: String },
    /// Agent proposes a candidate record; informs carry the record fields
    /// plus the default key set to the serialized record id.
    MatchFound { informs: SlotMap },
    /// Agent closes the conversation.
    Done,
}

impl AgentAct {
    /// Parse a finalized agent frame into a typed act.
    pub fn from_frame(frame: &Frame) -> AgentAct {
        match frame.intent {
            Intent::Request => {
                let slot = frame
                    .request_slots
                    .keys()
                    .next()
                    .unwrap_or_else(|| panic!("agent request frame carries no request slot"));
                AgentAct::Request { slot: slot.clone() }
            }
            Intent::Inform => {
                let (slot, value) = frame
                    .inform_slots
                    .iter()
                    .next()
                    .unwrap_or_else(|| panic!("agent inform frame carries no inform slot"));
                AgentAct::Inform {
                    slot: slot.clone(),
                    value: value.clone(),
                }
            }
            Intent::MatchFound => AgentAct::MatchFound {
                informs: frame.inform_slots.clone(),
            },
            Intent::Done => AgentAct::Done,
            Intent::Ok | Intent::Reject => {
                panic!("agent frame carries user-only intent {:?}", frame.intent)
            }
        }
    }
}

/// A user goal: the constraints the simulated user holds and the slots it
/// wants answered.
///
/// Sampled once per episode from the goal corpus; immutable afterwards
/// except for the controlled default-key bookkeeping in the simulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub inform_slots: SlotMap,
    #[serde(default)]
    pub request_slots: SlotMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(pairs: &[(&str, &str)]) -> SlotMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_user_frame_requests_are_unk() {
        let requests = slots(&[("cost_product", "whatever")]);
        let frame = Frame::user(Intent::Request, SlotMap::new(), &requests);

        assert_eq!(frame.request_slots.get("cost_product").unwrap(), UNK);
        assert_eq!(frame.speaker, Speaker::User);
    }

    #[test]
    fn test_agent_act_parse_request() {
        let frame = Frame::agent(
            Intent::Request,
            SlotMap::new(),
            slots(&[("size_product", UNK)]),
        );
        let act = AgentAct::from_frame(&frame);
        assert_eq!(
            act,
            AgentAct::Request {
                slot: "size_product".to_string()
            }
        );
    }

    #[test]
    fn test_agent_act_parse_inform() {
        let frame = Frame::agent(
            Intent::Inform,
            slots(&[("color_product", "navy")]),
            SlotMap::new(),
        );
        let act = AgentAct::from_frame(&frame);
        assert_eq!(
            act,
            AgentAct::Inform {
                slot: "color_product".to_string(),
                value: "navy".to_string()
            }
        );
    }

    #[test]
    #[should_panic(expected = "no request slot")]
    fn test_agent_act_parse_missing_request_slot_panics() {
        let frame = Frame::agent(Intent::Request, SlotMap::new(), SlotMap::new());
        let _ = AgentAct::from_frame(&frame);
    }

    #[test]
    #[should_panic(expected = "user-only intent")]
    fn test_agent_act_parse_user_only_intent_panics() {
        let frame = Frame::agent(Intent::Ok, SlotMap::new(), SlotMap::new());
        let _ = AgentAct::from_frame(&frame);
    }

    #[test]
    fn test_frame_serde_roundtrip() {
        let frame = Frame::agent(
            Intent::MatchFound,
            slots(&[("name_product", "linen shirt"), ("shopping", "3")]),
            SlotMap::new(),
        );
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, parsed);
    }

    #[test]
    fn test_intent_serde_names() {
        let json = serde_json::to_string(&Intent::MatchFound).unwrap();
        assert_eq!(json, "\"match_found\"");
        let parsed: Intent = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(parsed, Intent::Reject);
    }
}
