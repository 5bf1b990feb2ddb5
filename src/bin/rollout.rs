// src/bin/rollout.rs
//
// Research-harness CLI for the dialogue environment.
//
// Runs N episodes of the rule-based baseline policy against the user
// simulator, printing a concise run header and summary stats. Catalog
// and goal corpus load from JSON files, falling back to the built-in
// shopping demo data.

use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser};

use convosim::{
    run_episode, Catalog, DialogueConfig, DialogueEnv, EnvConfig, FileSink, GoalCorpus,
    RulePolicy,
};

#[derive(Debug, Parser)]
#[command(
    name = "rollout",
    about = "Goal-oriented dialogue simulator (research harness)",
    version
)]
struct Args {
    /// Number of episodes to run.
    #[arg(long, default_value_t = 100)]
    episodes: u64,

    /// Deterministic base seed; episode i runs with seed + i.
    #[arg(long)]
    seed: Option<u64>,

    /// Catalog JSON file (record id -> slot map). Built-in demo data if
    /// omitted.
    #[arg(long)]
    catalog: Option<String>,

    /// Goal corpus JSON file (array of goals). Built-in demo data if
    /// omitted.
    #[arg(long)]
    goals: Option<String>,

    /// Round ceiling per episode.
    #[arg(long, default_value_t = 20)]
    max_rounds: u32,

    /// Per-informed-slot error probability.
    #[arg(long, default_value_t = 0.05)]
    slot_error_prob: f64,

    /// Slot error mode: 0 value, 1 slot, 2 removal, 3 uniform.
    #[arg(long, default_value_t = 0)]
    slot_error_mode: u8,

    /// Intent randomisation probability.
    #[arg(long, default_value_t = 0.0)]
    intent_error_prob: f64,

    /// Write per-turn JSONL telemetry to this file.
    #[arg(long)]
    log: Option<String>,

    /// Verbosity: -v prints per-episode summaries.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("rollout: {}", err);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = Arc::new(match &args.catalog {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::demo(),
    });
    let corpus = Arc::new(match &args.goals {
        Some(path) => GoalCorpus::from_json_file(path)?,
        None => GoalCorpus::demo(),
    });

    let cfg = Arc::new(DialogueConfig::default());
    let env_cfg = EnvConfig {
        max_round_num: args.max_rounds,
        slot_error_prob: args.slot_error_prob,
        slot_error_mode: args.slot_error_mode,
        intent_error_prob: args.intent_error_prob,
    };

    let mut env = DialogueEnv::new(Arc::clone(&cfg), env_cfg.clone(), catalog.clone(), corpus.clone())?;
    if let Some(path) = &args.log {
        env.set_sink(Box::new(FileSink::create(path)?));
    }
    let mut policy = RulePolicy::new(Arc::clone(&cfg));

    println!(
        "rollout | records={} | goals={} | episodes={} | max_rounds={} | slot_err={}/mode{} | intent_err={} | seed={}",
        catalog.len(),
        corpus.len(),
        args.episodes,
        env_cfg.max_round_num,
        env_cfg.slot_error_prob,
        env_cfg.slot_error_mode,
        env_cfg.intent_error_prob,
        args.seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let mut successes = 0u64;
    let mut total_reward = 0.0;
    let mut total_rounds = 0u64;

    for i in 0..args.episodes {
        let seed = args.seed.map(|s| s + i);
        let summary = run_episode(&mut env, &mut policy, seed);
        if summary.is_success() {
            successes += 1;
        }
        total_reward += summary.total_reward;
        total_rounds += summary.rounds as u64;

        if args.verbose > 0 {
            println!(
                "episode {:>5} | seed={} | outcome={} | rounds={} | reward={}",
                i,
                summary.seed,
                summary.outcome.as_str(),
                summary.rounds,
                summary.total_reward
            );
        }
    }

    let n = args.episodes.max(1) as f64;
    println!(
        "done | episodes={} | success_rate={:.3} | avg_reward={:.2} | avg_rounds={:.2}",
        args.episodes,
        successes as f64 / n,
        total_reward / n,
        total_rounds as f64 / n
    );

    Ok(())
}
