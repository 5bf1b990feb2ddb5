// src/error_injector.rs
//
// Stochastic corruption of user frames, simulating NLU noise.
//
// Applied to a user frame after the reward is computed but before the
// state tracker sees it, and only while the episode is live. Slot-level
// and intent-level corruption draw independently from the shared
// environment RNG, so a fixed seed reproduces the exact same noise.

use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::catalog::Catalog;
use crate::config::{DialogueConfig, EnvConfig};
use crate::types::Frame;

/// Slot error modes. `Uniform` draws one of the other three with equal
/// probability per corrupted slot.
const MODE_VALUE: u8 = 0;
const MODE_SLOT: u8 = 1;
const MODE_REMOVE: u8 = 2;
const MODE_UNIFORM: u8 = 3;

pub struct ErrorInjector {
    cfg: Arc<DialogueConfig>,
    catalog: Arc<Catalog>,
    slot_error_prob: f64,
    slot_error_mode: u8,
    intent_error_prob: f64,
}

impl ErrorInjector {
    pub fn new(cfg: Arc<DialogueConfig>, env_cfg: &EnvConfig, catalog: Arc<Catalog>) -> Self {
        ErrorInjector {
            cfg,
            catalog,
            slot_error_prob: env_cfg.slot_error_prob,
            slot_error_mode: env_cfg.slot_error_mode,
            intent_error_prob: env_cfg.intent_error_prob,
        }
    }

    /// Corrupt a user frame in place.
    ///
    /// Each informed slot is independently corrupted with probability
    /// `slot_error_prob`; the intent is independently replaced with
    /// probability `intent_error_prob`.
    pub fn infuse(&self, frame: &mut Frame, rng: &mut ChaCha8Rng) {
        let informed: Vec<String> = frame.inform_slots.keys().cloned().collect();
        for slot in informed {
            if rng.gen::<f64>() < self.slot_error_prob {
                let mode = if self.slot_error_mode == MODE_UNIFORM {
                    rng.gen_range(MODE_VALUE..MODE_UNIFORM)
                } else {
                    self.slot_error_mode
                };
                match mode {
                    MODE_VALUE => self.value_noise(frame, &slot, rng),
                    MODE_SLOT => self.slot_noise(frame, &slot, rng),
                    MODE_REMOVE => {
                        frame.inform_slots.remove(&slot);
                    }
                    _ => unreachable!("slot error mode validated at startup"),
                }
            }
        }

        if rng.gen::<f64>() < self.intent_error_prob {
            let intents = &self.cfg.usersim_intents;
            frame.intent = intents[rng.gen_range(0..intents.len())];
        }
    }

    /// Replace the slot's value with a different legal catalog value.
    /// A slot with a single-value pool (or none) is left unchanged.
    fn value_noise(&self, frame: &mut Frame, slot: &str, rng: &mut ChaCha8Rng) {
        let current = frame.inform_slots[slot].clone();
        let alternatives: Vec<&String> = match self.catalog.slot_values(slot) {
            Some(values) => values.iter().filter(|v| **v != current).collect(),
            None => return,
        };
        if alternatives.is_empty() {
            return;
        }
        let replacement = alternatives[rng.gen_range(0..alternatives.len())].clone();
        frame.inform_slots.insert(slot.to_string(), replacement);
    }

    /// Delete the slot and inform a different random slot with a random
    /// legal value instead.
    fn slot_noise(&self, frame: &mut Frame, slot: &str, rng: &mut ChaCha8Rng) {
        frame.inform_slots.remove(slot);

        let other_slots: Vec<&String> = self
            .cfg
            .all_slots
            .iter()
            .filter(|s| s.as_str() != slot)
            .collect();
        if other_slots.is_empty() {
            return;
        }
        let new_slot = other_slots[rng.gen_range(0..other_slots.len())].clone();
        if let Some(values) = self.catalog.slot_values(&new_slot) {
            if !values.is_empty() {
                let value = values[rng.gen_range(0..values.len())].clone();
                frame.inform_slots.insert(new_slot, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Intent, SlotMap};
    use rand::SeedableRng;

    fn make_injector(prob: f64, mode: u8, intent_prob: f64) -> ErrorInjector {
        let env_cfg = EnvConfig {
            slot_error_prob: prob,
            slot_error_mode: mode,
            intent_error_prob: intent_prob,
            ..EnvConfig::default()
        };
        ErrorInjector::new(
            Arc::new(DialogueConfig::default()),
            &env_cfg,
            Arc::new(Catalog::demo()),
        )
    }

    fn user_frame() -> Frame {
        let informs: SlotMap = [
            ("name_product".to_string(), "linen shirt".to_string()),
            ("size_product".to_string(), "M".to_string()),
        ]
        .into_iter()
        .collect();
        Frame::user(Intent::Inform, informs, &SlotMap::new())
    }

    #[test]
    fn test_zero_probability_leaves_frame_untouched() {
        let injector = make_injector(0.0, 0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let original = user_frame();
        let mut frame = original.clone();
        for _ in 0..50 {
            injector.infuse(&mut frame, &mut rng);
        }
        assert_eq!(frame, original);
    }

    #[test]
    fn test_removal_mode_at_full_probability_drops_all_informs() {
        let injector = make_injector(1.0, 2, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let mut frame = user_frame();
        injector.infuse(&mut frame, &mut rng);
        assert!(frame.inform_slots.is_empty());
    }

    #[test]
    fn test_value_noise_picks_different_legal_value() {
        let injector = make_injector(1.0, 0, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..20 {
            let mut frame = user_frame();
            injector.infuse(&mut frame, &mut rng);
            // Slot set unchanged; every value is still a legal catalog
            // value but differs from the original.
            assert_eq!(frame.inform_slots.len(), 2);
            let name = frame.inform_slots.get("name_product").unwrap();
            assert_ne!(name, "linen shirt");
            assert!(injector
                .catalog
                .slot_values("name_product")
                .unwrap()
                .contains(name));
        }
    }

    #[test]
    fn test_slot_noise_replaces_slot() {
        let injector = make_injector(1.0, 1, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let mut frame = user_frame();
        injector.infuse(&mut frame, &mut rng);
        // Both original slots were corrupted; whatever replaced them came
        // from the configured slot set with legal catalog values.
        for (slot, value) in &frame.inform_slots {
            assert!(injector.cfg.all_slots.contains(slot));
            if let Some(values) = injector.catalog.slot_values(slot) {
                assert!(values.contains(value));
            }
        }
    }

    #[test]
    fn test_intent_error_replaces_with_user_intent() {
        let injector = make_injector(0.0, 0, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for _ in 0..20 {
            let mut frame = user_frame();
            injector.infuse(&mut frame, &mut rng);
            assert!(injector.cfg.usersim_intents.contains(&frame.intent));
        }
    }

    #[test]
    fn test_same_seed_same_corruption() {
        let injector = make_injector(0.5, 3, 0.3);

        let mut rng1 = ChaCha8Rng::seed_from_u64(99);
        let mut rng2 = ChaCha8Rng::seed_from_u64(99);
        for _ in 0..50 {
            let mut f1 = user_frame();
            let mut f2 = user_frame();
            injector.infuse(&mut f1, &mut rng1);
            injector.infuse(&mut f2, &mut rng2);
            assert_eq!(f1, f2);
        }
    }
}
