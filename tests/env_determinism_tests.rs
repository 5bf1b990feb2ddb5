// tests/env_determinism_tests.rs
//
// Seeded determinism of the dialogue environment: the same seed and
// action sequence must reproduce an episode byte-for-byte, including
// the stochastic error injection.

use std::sync::Arc;

use convosim::{
    run_episode, Catalog, DialogueConfig, DialogueEnv, EnvConfig, GoalCorpus, Policy, RulePolicy,
    VecEnv,
};

fn noisy_env_cfg() -> EnvConfig {
    EnvConfig {
        max_round_num: 20,
        slot_error_prob: 0.3,
        slot_error_mode: 3,
        intent_error_prob: 0.1,
    }
}

fn make_env(env_cfg: EnvConfig) -> DialogueEnv {
    DialogueEnv::new(
        Arc::new(DialogueConfig::default()),
        env_cfg,
        Arc::new(Catalog::demo()),
        Arc::new(GoalCorpus::demo()),
    )
    .unwrap()
}

/// Full rule-policy episode, recorded as canonical observation JSON.
fn episode_trace(env: &mut DialogueEnv, seed: u64) -> Vec<String> {
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
}

#[test]
fn test_same_seed_reproduces_episode_exactly() {
    let mut env_a = make_env(noisy_env_cfg());
    let mut env_b = make_env(noisy_env_cfg());

    for seed in [0u64, 1, 42, 1_000_003] {
        assert_eq!(
            episode_trace(&mut env_a, seed),
            episode_trace(&mut env_b, seed),
            "seed {} diverged",
            seed
        );
    }
}

#[test]
fn test_different_seeds_diverge() {
    let mut env = make_env(noisy_env_cfg());

    let traces: Vec<Vec<String>> = (0..8).map(|seed| episode_trace(&mut env, seed)).collect();
    // At least one pair of seeds must produce different trajectories;
    // with goal sampling plus noise all equal would mean a broken RNG.
    let all_equal = traces.windows(2).all(|w| w[0] == w[1]);
    assert!(!all_equal);
}

#[test]
fn test_reuse_of_one_env_matches_fresh_env() {
    let mut reused = make_env(noisy_env_cfg());
    // Run a throwaway episode first; reset must fully clear state.
    episode_trace(&mut reused, 999);

    let mut fresh = make_env(noisy_env_cfg());
    assert_eq!(episode_trace(&mut reused, 7), episode_trace(&mut fresh, 7));
}

#[test]
fn test_shared_matcher_cache_does_not_affect_results() {
    // VecEnv shares one matcher cache across envs; results must equal a
    // private-cache env with the same seed.
    let cfg = Arc::new(DialogueConfig::default());
    let mut vec_env = VecEnv::new(
        2,
        Arc::clone(&cfg),
        EnvConfig::deterministic(),
        Arc::new(Catalog::demo()),
        Arc::new(GoalCorpus::demo()),
    )
    .unwrap();

    let batched = vec_env.reset_all(Some(&[5, 6]));

    let mut solo_a = make_env(EnvConfig::deterministic());
    let mut solo_b = make_env(EnvConfig::deterministic());
    assert_eq!(
        batched[0].to_canonical_json(),
        solo_a.reset(Some(5)).to_canonical_json()
    );
    assert_eq!(
        batched[1].to_canonical_json(),
        solo_b.reset(Some(6)).to_canonical_json()
    );
}

#[test]
fn test_unseeded_reset_still_terminates() {
    let mut env = make_env(noisy_env_cfg());
    let mut policy = RulePolicy::new(Arc::new(DialogueConfig::default()));

    for _ in 0..5 {
        let summary = run_episode(&mut env, &mut policy, None);
        assert!(summary.rounds <= 20);
    }
}
