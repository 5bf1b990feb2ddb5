// src/config.rs
//
// Central configuration for the dialogue environment.
//
// Two layers:
// - DialogueConfig: the shared slot/intent taxonomy (immutable, built once,
//   passed explicitly to every component constructor).
// - EnvConfig: per-run knobs (round ceiling, error-model probabilities).
//
// Both validate at startup; invalid configuration is fatal, no retry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::Intent;

/// Shared slot/intent taxonomy used by every component.
///
/// Constructed once per run and passed by `Arc` to each component; never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Intents the user simulator may emit (also the pool for intent-level
    /// error injection).
    pub usersim_intents: Vec<Intent>,
    /// All intents, for one-hot encoding in the state tracker.
    pub all_intents: Vec<Intent>,
    /// All slots, for multi-hot encoding in the state tracker.
    pub all_slots: Vec<String>,
    /// Slots the agent may inform (the default key among them must be
    /// informed via `match_found`, never via `inform`).
    pub agent_inform_slots: Vec<String>,
    /// Slots the agent may request.
    pub agent_request_slots: Vec<String>,
    /// The slot whose value the agent must ultimately propose via
    /// `match_found` (a serialized record id).
    pub default_key: String,
    /// Goal inform slots that, when present, must appear in the user's
    /// first action.
    pub required_init_inform_keys: Vec<String>,
    /// Inform slots that are never used as query constraints and are
    /// excluded from match verification.
    pub no_query_slots: BTreeSet<String>,
    /// Slot order walked by the rule-based warmup policy.
    pub rule_requests: Vec<String>,
}

impl Default for DialogueConfig {
    /// The shopping taxonomy: product slots plus the `shopping` default key.
    fn default() -> Self {
        let slot = |s: &str| s.to_string();
        let default_key = "shopping".to_string();
        DialogueConfig {
            usersim_intents: vec![
                Intent::Inform,
                Intent::Request,
                Intent::Ok,
                Intent::Reject,
                Intent::Done,
            ],
            all_intents: vec![
                Intent::Inform,
                Intent::Request,
                Intent::Done,
                Intent::MatchFound,
                Intent::Ok,
                Intent::Reject,
            ],
            all_slots: vec![
                slot("name_product"),
                slot("size_product"),
                slot("color_product"),
                slot("cost_product"),
                slot("material_product"),
                slot("amount_product"),
                default_key.clone(),
            ],
            agent_inform_slots: vec![
                slot("name_product"),
                slot("size_product"),
                slot("color_product"),
                slot("material_product"),
                slot("cost_product"),
                default_key.clone(),
            ],
            agent_request_slots: vec![
                slot("name_product"),
                slot("size_product"),
                slot("color_product"),
                slot("material_product"),
                slot("cost_product"),
                slot("amount_product"),
            ],
            required_init_inform_keys: vec![slot("name_product")],
            no_query_slots: [slot("amount_product"), default_key.clone()]
                .into_iter()
                .collect(),
            rule_requests: vec![
                slot("name_product"),
                slot("size_product"),
                slot("color_product"),
                slot("material_product"),
                slot("cost_product"),
                slot("amount_product"),
            ],
            default_key,
        }
    }
}

impl DialogueConfig {
    /// Validate taxonomy consistency. Fatal at startup if violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.all_intents.is_empty() {
            return Err(ConfigError::invalid("all_intents", "must not be empty"));
        }
        if self.usersim_intents.is_empty() {
            return Err(ConfigError::invalid("usersim_intents", "must not be empty"));
        }
        if self.all_slots.is_empty() {
            return Err(ConfigError::invalid("all_slots", "must not be empty"));
        }
        if !self.all_slots.contains(&self.default_key) {
            return Err(ConfigError::invalid(
                "default_key",
                "must be listed in all_slots",
            ));
        }
        if !self.no_query_slots.contains(&self.default_key) {
            return Err(ConfigError::invalid(
                "no_query_slots",
                "must contain the default key",
            ));
        }
        for key in &self.required_init_inform_keys {
            if !self.all_slots.contains(key) {
                return Err(ConfigError::invalid(
                    "required_init_inform_keys",
                    "every key must be listed in all_slots",
                ));
            }
        }
        for key in self
            .agent_inform_slots
            .iter()
            .chain(self.agent_request_slots.iter())
        {
            if !self.all_slots.contains(key) {
                return Err(ConfigError::invalid(
                    "agent_inform_slots/agent_request_slots",
                    "every key must be listed in all_slots",
                ));
            }
        }
        Ok(())
    }
}

/// Per-run environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Round ceiling; reaching it forces termination with outcome FAIL.
    pub max_round_num: u32,
    /// Per-informed-slot error probability in [0, 1].
    pub slot_error_prob: f64,
    /// Slot error mode: 0 value noise, 1 slot noise, 2 slot removal,
    /// 3 uniform thirds over the other three.
    pub slot_error_mode: u8,
    /// Intent randomisation probability in [0, 1].
    pub intent_error_prob: f64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        EnvConfig {
            max_round_num: 20,
            slot_error_prob: 0.05,
            slot_error_mode: 0,
            intent_error_prob: 0.0,
        }
    }
}

impl EnvConfig {
    /// A config with no stochastic corruption (for deterministic tests).
    pub fn deterministic() -> Self {
        EnvConfig {
            max_round_num: 20,
            slot_error_prob: 0.0,
            slot_error_mode: 0,
            intent_error_prob: 0.0,
        }
    }

    /// Validate ranges. Fatal at startup if violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_round_num == 0 {
            return Err(ConfigError::invalid("max_round_num", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.slot_error_prob) {
            return Err(ConfigError::invalid(
                "slot_error_prob",
                "must be within [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.intent_error_prob) {
            return Err(ConfigError::invalid(
                "intent_error_prob",
                "must be within [0, 1]",
            ));
        }
        if self.slot_error_mode > 3 {
            return Err(ConfigError::invalid(
                "slot_error_mode",
                "must be one of 0, 1, 2, 3",
            ));
        }
        Ok(())
    }
}

/// Errors raised by configuration validation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidField { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: &str) -> Self {
        ConfigError::InvalidField {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidField { field, message } => {
                write!(f, "invalid config field '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dialogue_config_validates() {
        let cfg = DialogueConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.default_key, "shopping");
        assert!(cfg.no_query_slots.contains("shopping"));
        assert!(cfg.no_query_slots.contains("amount_product"));
    }

    #[test]
    fn test_default_env_config_validates() {
        assert!(EnvConfig::default().validate().is_ok());
        assert!(EnvConfig::deterministic().validate().is_ok());
    }

    #[test]
    fn test_env_config_rejects_bad_prob() {
        let cfg = EnvConfig {
            slot_error_prob: 1.5,
            ..EnvConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_config_rejects_bad_mode() {
        let cfg = EnvConfig {
            slot_error_mode: 4,
            ..EnvConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_config_rejects_zero_rounds() {
        let cfg = EnvConfig {
            max_round_num: 0,
            ..EnvConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_dialogue_config_rejects_missing_default_key() {
        let mut cfg = DialogueConfig::default();
        cfg.default_key = "ticket".to_string();
        assert!(cfg.validate().is_err());
    }
}
