// src/env.rs
//
// Gym-style dialogue environment.
//
// - DialogueEnv: single environment (reset, step)
// - VecEnv: vectorised environments for parallel rollouts
// - run_episode: drives a policy to termination
//
// Deterministic given seeds: every stochastic choice (goal sampling, the
// simulator's random picks, error injection) flows through one ChaCha8
// RNG reseeded at reset.

use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, GoalCorpus};
use crate::config::{ConfigError, DialogueConfig, EnvConfig};
use crate::error_injector::ErrorInjector;
use crate::logging::{NoopSink, TurnRecord, TurnSink};
use crate::matcher::ConstraintMatcher;
use crate::policy::Policy;
use crate::reward::Outcome;
use crate::tracker::{DialogueObservation, StateTracker};
use crate::types::Frame;
use crate::user_sim::UserSimulator;

/// Result of a single environment step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The observation after taking the action.
    pub observation: DialogueObservation,
    /// The reward for this step.
    pub reward: f64,
    /// Whether the episode has terminated.
    pub done: bool,
    /// Additional information about the step.
    pub info: StepInfo,
}

/// Additional information returned from a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInfo {
    /// Round stamped on the agent frame this step.
    pub round: u32,
    /// Terminal outcome; `NoOutcome` while the episode is live.
    pub outcome: Outcome,
    /// Records matching the accumulated constraints after this step.
    pub match_count: usize,
}

impl Default for StepInfo {
    fn default() -> Self {
        StepInfo {
            round: 0,
            outcome: Outcome::NoOutcome,
            match_count: 0,
        }
    }
}

/// Gym-style goal-oriented dialogue environment.
///
/// Wraps the user simulator, state tracker and error injector behind a
/// standard RL interface:
/// - reset(seed) -> observation
/// - step(frame) -> (observation, reward, done, info)
pub struct DialogueEnv {
    cfg: Arc<DialogueConfig>,
    env_cfg: EnvConfig,
    user: UserSimulator,
    tracker: StateTracker,
    injector: ErrorInjector,
    sink: Box<dyn TurnSink>,
    rng: ChaCha8Rng,
    seed: u64,
    episode: u64,
    done: bool,
    last_outcome: Outcome,
}

impl DialogueEnv {
    /// Build an environment with a private constraint-matcher cache.
    pub fn new(
        cfg: Arc<DialogueConfig>,
        env_cfg: EnvConfig,
        catalog: Arc<Catalog>,
        corpus: Arc<GoalCorpus>,
    ) -> Result<Self, ConfigError> {
        let matcher = Arc::new(ConstraintMatcher::new(Arc::clone(&catalog), &cfg));
        Self::with_matcher(cfg, env_cfg, catalog, corpus, matcher)
    }

    /// Build an environment around a shared matcher (shared cache across
    /// envs; entries are write-once so concurrent population is safe).
    pub fn with_matcher(
        cfg: Arc<DialogueConfig>,
        env_cfg: EnvConfig,
        catalog: Arc<Catalog>,
        corpus: Arc<GoalCorpus>,
        matcher: Arc<ConstraintMatcher>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        env_cfg.validate()?;

        let user = UserSimulator::new(
            Arc::clone(&cfg),
            &env_cfg,
            corpus,
            Arc::clone(&catalog),
        );
        let tracker = StateTracker::new(Arc::clone(&cfg), &env_cfg, matcher);
        let injector = ErrorInjector::new(Arc::clone(&cfg), &env_cfg, catalog);

        Ok(DialogueEnv {
            cfg,
            env_cfg,
            user,
            tracker,
            injector,
            sink: Box::new(NoopSink),
            rng: ChaCha8Rng::seed_from_u64(0),
            seed: 0,
            episode: 0,
            done: false,
            last_outcome: Outcome::NoOutcome,
        })
    }

    /// Replace the turn sink (defaults to `NoopSink`).
    pub fn set_sink(&mut self, sink: Box<dyn TurnSink>) {
        self.sink = sink;
    }

    /// Reset the environment with an optional seed.
    ///
    /// Samples a new goal, emits the user's opening frame through the
    /// error injector into the tracker, and returns the initial
    /// observation.
    pub fn reset(&mut self, seed: Option<u64>) -> DialogueObservation {
        let seed = seed.unwrap_or_else(|| self.rng.gen());
        self.seed = seed;
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.episode += 1;
        self.done = false;
        self.last_outcome = Outcome::NoOutcome;

        self.tracker.reset();
        let mut opening = self.user.reset(&mut self.rng);
        self.injector.infuse(&mut opening, &mut self.rng);
        self.tracker.update_state_user(&mut opening);

        self.tracker.get_state(false)
    }

    /// Take one agent turn.
    ///
    /// The frame is a policy action template: the tracker fills it
    /// (PLACEHOLDER informs, match_found record), the user simulator
    /// responds and scores it, the error injector corrupts the live
    /// response, and the tracker folds the result.
    pub fn step(&mut self, frame: &Frame) -> StepResult {
        if self.done {
            // Stepping a finished episode is a no-op with zero reward.
            return StepResult {
                observation: self.tracker.get_state(true),
                reward: 0.0,
                done: true,
                info: StepInfo {
                    round: self.tracker.round_num(),
                    outcome: self.last_outcome,
                    match_count: 0,
                },
            };
        }

        assert_eq!(
            frame.round,
            self.tracker.round_num(),
            "policy frame not stamped with the current round"
        );

        let mut agent_frame = frame.clone();
        self.tracker.update_state_agent(&mut agent_frame);

        let mut step = self.user.step(&agent_frame, &mut self.rng);
        if !step.done {
            self.injector.infuse(&mut step.response, &mut self.rng);
        }
        self.tracker.update_state_user(&mut step.response);

        self.done = step.done;
        self.last_outcome = step.outcome;

        let observation = self.tracker.get_state(step.done);
        self.sink.log_turn(&TurnRecord {
            episode: self.episode,
            round: agent_frame.round,
            agent_frame: &agent_frame,
            user_frame: &step.response,
            reward: step.reward,
            done: step.done,
            outcome: step.outcome,
        });

        let match_count = observation.match_count;
        StepResult {
            observation,
            reward: step.reward,
            done: step.done,
            info: StepInfo {
                round: agent_frame.round,
                outcome: step.outcome,
                match_count,
            },
        }
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.cfg
    }

    pub fn env_config(&self) -> &EnvConfig {
        &self.env_cfg
    }

    /// Seed of the current episode.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 1-based count of episodes started.
    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Outcome of the last finished step.
    pub fn last_outcome(&self) -> Outcome {
        self.last_outcome
    }
}

/// Summary of one finished episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub seed: u64,
    /// Rounds consumed (the round of the terminal agent frame).
    pub rounds: u32,
    pub total_reward: f64,
    pub outcome: Outcome,
}

impl EpisodeSummary {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Drive a policy to episode termination.
///
/// Termination is guaranteed by the round ceiling.
pub fn run_episode(
    env: &mut DialogueEnv,
    policy: &mut dyn Policy,
    seed: Option<u64>,
) -> EpisodeSummary {
    policy.reset();
    let mut observation = env.reset(seed);
    let mut total_reward = 0.0;

    loop {
        let (_, frame) = policy.act(&observation);
        let step = env.step(&frame);
        total_reward += step.reward;
        if step.done {
            return EpisodeSummary {
                seed: env.seed(),
                rounds: step.info.round,
                total_reward,
                outcome: step.info.outcome,
            };
        }
        observation = step.observation;
    }
}

/// Vectorised environments for parallel rollouts.
///
/// All envs share one catalog and one constraint-matcher cache.
pub struct VecEnv {
    envs: Vec<DialogueEnv>,
}

impl VecEnv {
    /// Create a vectorised environment with N copies.
    pub fn new(
        n: usize,
        cfg: Arc<DialogueConfig>,
        env_cfg: EnvConfig,
        catalog: Arc<Catalog>,
        corpus: Arc<GoalCorpus>,
    ) -> Result<Self, ConfigError> {
        let matcher = Arc::new(ConstraintMatcher::new(Arc::clone(&catalog), &cfg));
        let mut envs = Vec::with_capacity(n);
        for _ in 0..n {
            envs.push(DialogueEnv::with_matcher(
                Arc::clone(&cfg),
                env_cfg.clone(),
                Arc::clone(&catalog),
                Arc::clone(&corpus),
                Arc::clone(&matcher),
            )?);
        }
        Ok(VecEnv { envs })
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    /// Reset all environments with optional per-environment seeds.
    ///
    /// Envs without a corresponding seed entry draw a random one.
    pub fn reset_all(&mut self, seeds: Option<&[u64]>) -> Vec<DialogueObservation> {
        self.envs
            .iter_mut()
            .enumerate()
            .map(|(i, env)| {
                let seed = seeds.and_then(|s| s.get(i).copied());
                env.reset(seed)
            })
            .collect()
    }

    /// Step all environments with the given action frames.
    pub fn step(&mut self, frames: &[Frame]) -> Vec<StepResult> {
        assert_eq!(
            frames.len(),
            self.envs.len(),
            "actions length must match number of environments"
        );
        self.envs
            .iter_mut()
            .zip(frames.iter())
            .map(|(env, frame)| env.step(frame))
            .collect()
    }

    pub fn envs_mut(&mut self) -> &mut [DialogueEnv] {
        &mut self.envs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RulePolicy;
    use crate::types::{Goal, Intent, SlotMap, UNK};

    fn demo_env(env_cfg: EnvConfig) -> DialogueEnv {
        DialogueEnv::new(
            Arc::new(DialogueConfig::default()),
            env_cfg,
            Arc::new(Catalog::demo()),
            Arc::new(GoalCorpus::demo()),
        )
        .unwrap()
    }

    fn constraint_goal() -> Goal {
        // Resolvable against demo record 2, no request slots, so the
        // rule policy can close it successfully.
        Goal {
            intent: Intent::Request,
            inform_slots: [
                ("name_product".to_string(), "denim jacket".to_string()),
                ("color_product".to_string(), "blue".to_string()),
            ]
            .into_iter()
            .collect(),
            request_slots: SlotMap::new(),
        }
    }

    fn constraint_env() -> DialogueEnv {
        DialogueEnv::new(
            Arc::new(DialogueConfig::default()),
            EnvConfig::deterministic(),
            Arc::new(Catalog::demo()),
            Arc::new(GoalCorpus::new(vec![constraint_goal()]).unwrap()),
        )
        .unwrap()
    }

    #[test]
    fn test_reset_returns_opening_observation() {
        let mut env = demo_env(EnvConfig::deterministic());
        let obs = env.reset(Some(7));

        assert_eq!(obs.round, 1);
        assert!(!obs.done);
        assert_eq!(env.seed(), 7);
        assert_eq!(env.episode(), 1);
    }

    #[test]
    fn test_rule_policy_closes_constraint_only_goal() {
        let mut env = constraint_env();
        let mut policy = RulePolicy::new(Arc::new(DialogueConfig::default()));

        let summary = run_episode(&mut env, &mut policy, Some(3));

        assert_eq!(summary.outcome, Outcome::Success);
        // 6 rule requests + match_found at -1 each, then the terminal
        // done at -1 + 2 * 20.
        assert_eq!(summary.total_reward, -7.0 + 39.0);
        assert_eq!(summary.rounds, 8);
    }

    #[test]
    fn test_round_ceiling_forces_failure() {
        let mut env = demo_env(EnvConfig {
            max_round_num: 3,
            ..EnvConfig::deterministic()
        });
        let mut obs = env.reset(Some(1));

        // An agent that only ever requests never terminates on its own.
        let requests: SlotMap = [("size_product".to_string(), UNK.to_string())]
            .into_iter()
            .collect();
        loop {
            let mut frame = Frame::agent(Intent::Request, SlotMap::new(), requests.clone());
            frame.round = obs.round;
            let step = env.step(&frame);
            if step.done {
                assert_eq!(step.info.outcome, Outcome::Fail);
                assert_eq!(step.info.round, 3);
                assert_eq!(step.reward, -4.0);
                break;
            }
            obs = step.observation;
        }
    }

    #[test]
    fn test_step_after_done_is_noop() {
        let mut env = constraint_env();
        let obs = env.reset(Some(5));

        let mut frame = Frame::agent(Intent::Done, SlotMap::new(), SlotMap::new());
        frame.round = obs.round;
        let step = env.step(&frame);
        assert!(step.done);

        let again = env.step(&frame);
        assert!(again.done);
        assert_eq!(again.reward, 0.0);
    }

    #[test]
    #[should_panic(expected = "current round")]
    fn test_unstamped_policy_frame_is_fatal() {
        let mut env = constraint_env();
        env.reset(Some(5));

        let frame = Frame::agent(Intent::Done, SlotMap::new(), SlotMap::new());
        // round left at 0 while the tracker is at round 1
        env.step(&frame);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let run = |seed: u64| -> Vec<String> {
            let mut env = demo_env(EnvConfig {
                slot_error_prob: 0.3,
                slot_error_mode: 3,
                intent_error_prob: 0.1,
                ..EnvConfig::default()
            });
            let mut policy = RulePolicy::new(Arc::new(DialogueConfig::default()));
            policy.reset();
            let mut obs = env.reset(Some(seed));
            let mut trace = vec![obs.to_canonical_json()];
            loop {
                let (_, frame) = policy.act(&obs);
                let step = env.step(&frame);
                trace.push(step.observation.to_canonical_json());
                if step.done {
                    return trace;
                }
                obs = step.observation;
            }
        };

        assert_eq!(run(11), run(11));
        assert_ne!(run(11), run(12));
    }

    #[test]
    fn test_vec_env_batches_independent_envs() {
        let cfg = Arc::new(DialogueConfig::default());
        let mut vec_env = VecEnv::new(
            3,
            Arc::clone(&cfg),
            EnvConfig::deterministic(),
            Arc::new(Catalog::demo()),
            Arc::new(GoalCorpus::demo()),
        )
        .unwrap();

        let observations = vec_env.reset_all(Some(&[1, 2, 3]));
        assert_eq!(observations.len(), 3);

        let frames: Vec<Frame> = observations
            .iter()
            .map(|obs| {
                let requests: SlotMap = [("size_product".to_string(), UNK.to_string())]
                    .into_iter()
                    .collect();
                let mut frame = Frame::agent(Intent::Request, SlotMap::new(), requests);
                frame.round = obs.round;
                frame
            })
            .collect();
        let results = vec_env.step(&frames);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.done));
    }
}
