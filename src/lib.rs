//! Convosim core library.
//!
//! A goal-oriented dialogue environment for training task-completion
//! agents with reinforcement learning. The binary (`src/bin/rollout.rs`)
//! is just a thin research harness around these components.
//!
//! # Architecture
//!
//! One episode is a slot-filling conversation between a policy-driven
//! agent and a simulated user holding a private goal:
//!
//! - **Types** (`types`): the semantic `Frame` exchanged every turn,
//!   intents, sentinels, and the typed `AgentAct` view.
//! - **Catalog / goals** (`catalog`): the read-only record store and the
//!   goal corpus sampled once per episode.
//! - **Constraint Matcher** (`matcher`): exact-match DB queries with a
//!   write-once result cache keyed by the frozen constraint set.
//! - **User Simulator** (`user_sim`): goal-conditioned state machine that
//!   answers agent acts and decides episode success.
//! - **State Tracker** (`tracker`): round counter, template filling, and
//!   the versioned policy observation.
//! - **Error Injector** (`error_injector`): stochastic NLU-style
//!   corruption of user frames.
//! - **Environment** (`env`): Gym-style `reset(seed)` / `step(frame)`,
//!   plus `VecEnv` for parallel rollouts and `run_episode`.
//! - **Policy** (`policy`): the `Policy` trait, the feasible
//!   `ActionSpace`, and a deterministic `RulePolicy` baseline.
//!
//! All stochastic choices flow through one per-env ChaCha8 RNG, so the
//! same seed and action sequence reproduce an episode exactly.

pub mod catalog;
pub mod config;
pub mod env;
pub mod error_injector;
pub mod logging;
pub mod matcher;
pub mod policy;
pub mod reward;
pub mod tracker;
pub mod types;
pub mod user_sim;

// --- Re-exports for ergonomic external use ---------------------------------

pub use catalog::{Catalog, CorpusError, GoalCorpus};
pub use config::{ConfigError, DialogueConfig, EnvConfig};
pub use env::{run_episode, DialogueEnv, EpisodeSummary, StepInfo, StepResult, VecEnv};
pub use error_injector::ErrorInjector;
pub use logging::{FileSink, NoopSink, TurnRecord, TurnSink};
pub use matcher::{ConstraintMatcher, QueryResult};
pub use policy::{ActionSpace, Policy, RulePolicy};
pub use reward::{reward_for, Outcome};
pub use tracker::{DialogueObservation, StateTracker, OBS_VERSION};
pub use types::{
    AgentAct, Frame, Goal, Intent, RecordId, SlotMap, Speaker, ANYTHING, NO_MATCH, PLACEHOLDER,
    UNK,
};
pub use user_sim::{UserSimulator, UserStep};
