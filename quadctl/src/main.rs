// quad-rl control CLI
// Drives the DDPG and DQN agents over recorded quadrotor ticks

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

use quad_rl_agent::{
    run_episodes, CsvStatsSink, DDPGAgent, DDPGConfig, DQNAgent, DQNConfig, StatsColumn,
};
use quad_rl_core::telemetry::init_tracing;
use quad_rl_core::{Agent, Environment, EpisodeInfo, EpisodeStats, TaskSpec, TrackedEnvironment};
use quad_rl_env::{make_task, task_names, ClipAction, ScriptedEnv, TimeLimit};

#[derive(Parser)]
#[command(name = "quadctl")]
#[command(about = "Quadrotor RL agent control CLI", version)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum AgentKind {
    /// Actor-critic over force x/y/z
    Ddpg,
    /// Epsilon-greedy Q-learning over vertical thrust levels
    Dqn,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an agent on a recorded tick file
    Train {
        /// Agent type
        #[arg(short, long, value_enum, default_value = "ddpg")]
        agent: AgentKind,

        /// Task name (takeoff, hover, landing)
        #[arg(short, long, default_value = "takeoff")]
        task: String,

        /// JSON-lines file of recorded ticks
        #[arg(long)]
        ticks: PathBuf,

        /// Agent configuration (JSON); defaults when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of episodes to run
        #[arg(long, default_value = "1")]
        episodes: usize,

        /// End episodes after this many steps
        #[arg(long)]
        max_steps: Option<usize>,

        /// Clip actions to the task bounds before replaying them
        #[arg(long)]
        clip_actions: bool,

        /// Seed overriding the configuration
        #[arg(long)]
        seed: Option<u64>,

        /// Weights to start from
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Output directory for stats and weights
        #[arg(short, long, default_value = "out")]
        out: PathBuf,
    },

    /// List available tasks
    Tasks,

    /// Print the default configuration of an agent as JSON
    Config {
        /// Agent type
        #[arg(value_enum)]
        agent: AgentKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Commands::Train {
            agent,
            task,
            ticks,
            config,
            episodes,
            max_steps,
            clip_actions,
            seed,
            weights,
            out,
        } => {
            let task = make_task(&task).with_context(|| format!("unknown task {task}"))?;
            let env = ScriptedEnv::from_jsonl(task.clone(), &ticks)
                .await
                .with_context(|| format!("Failed to load ticks from {}", ticks.display()))?;
            let mut env = wrap_env(env, max_steps, clip_actions);

            std::fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let (mut agent, weights_out) = build_agent(agent, task, config.as_deref(), seed, &out)?;

            if let Some(path) = weights {
                agent
                    .load_weights(&path)
                    .with_context(|| format!("Failed to load weights from {}", path.display()))?;
                info!(path = %path.display(), "loaded weights");
            }

            let stats = run_episodes(&mut env, agent.as_mut(), episodes).await?;
            env.close().await?;
            agent
                .save_weights(&weights_out)
                .with_context(|| format!("Failed to save weights to {}", weights_out.display()))?;
            print_summary(&stats, env.episode_info().as_ref(), &weights_out);
        }

        Commands::Tasks => {
            for name in task_names()? {
                let task = make_task(&name)?;
                println!(
                    "{name}: observation {} dims, action {} dims, state {:?}",
                    task.observation_space.dim(),
                    task.action_dim(),
                    task.state_range
                );
            }
        }

        Commands::Config { agent } => {
            let json = match agent {
                AgentKind::Ddpg => serde_json::to_string_pretty(&DDPGConfig::default())?,
                AgentKind::Dqn => serde_json::to_string_pretty(&DQNConfig::default())?,
            };
            println!("{json}");
        }
    }

    Ok(())
}

fn wrap_env(
    env: ScriptedEnv,
    max_steps: Option<usize>,
    clip_actions: bool,
) -> TrackedEnvironment<Box<dyn Environment>> {
    let env: Box<dyn Environment> = if clip_actions {
        Box::new(ClipAction::new(env))
    } else {
        Box::new(env)
    };
    let env = match max_steps {
        Some(limit) => Box::new(TimeLimit::new(env, limit)),
        None => env,
    };
    TrackedEnvironment::new(env)
}

fn build_agent(
    kind: AgentKind,
    task: TaskSpec,
    config: Option<&Path>,
    seed: Option<u64>,
    out: &Path,
) -> Result<(Box<dyn Agent>, PathBuf)> {
    match kind {
        AgentKind::Ddpg => {
            let mut config = match config {
                Some(path) => DDPGConfig::from_json_file(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?,
                None => DDPGConfig::default(),
            };
            if seed.is_some() {
                config.base.seed = seed;
            }
            let sink = CsvStatsSink::timestamped(out, StatsColumn::DDPG)?;
            info!(path = %sink.path().display(), "writing episode stats");
            let agent = DDPGAgent::new(task, config, Box::new(sink))?;
            Ok((Box::new(agent), out.join("ddpg_weights")))
        }
        AgentKind::Dqn => {
            let mut config = match config {
                Some(path) => DQNConfig::from_json_file(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?,
                None => DQNConfig::default(),
            };
            if seed.is_some() {
                config.base.seed = seed;
            }
            if config.checkpoint_dir.is_none() {
                config.checkpoint_dir = Some(out.to_path_buf());
            }
            let sink = CsvStatsSink::timestamped(out, StatsColumn::DQN)?;
            info!(path = %sink.path().display(), "writing episode stats");
            let agent = DQNAgent::new(task, config, Box::new(sink))?;
            Ok((Box::new(agent), out.join(quad_rl_agent::dqn::CHECKPOINT_FILE)))
        }
    }
}

fn print_summary(stats: &[EpisodeStats], last: Option<&EpisodeInfo>, weights: &Path) {
    if stats.is_empty() {
        println!("No episodes run");
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = stats.iter().map(|s| s.total_reward).sum::<f64>() / stats.len() as f64;
    let best = stats
        .iter()
        .map(|s| s.total_reward)
        .fold(f64::NEG_INFINITY, f64::max);
    println!("Episodes:     {}", stats.len());
    println!("Mean reward:  {mean:.3}");
    println!("Best reward:  {best:.3}");
    if let Some(eps) = stats.last().and_then(|s| s.epsilon) {
        println!("Epsilon:      {eps:.4}");
    }
    if let Some(end) = last.and_then(|info| info.end_time.map(|end| end - info.start_time)) {
        println!("Last episode: {} ms", end.num_milliseconds());
    }
    println!("Weights:      {}", weights.display());
}
