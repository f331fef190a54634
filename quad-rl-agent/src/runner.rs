//! Drive an environment with an agent, one tick at a time

use tracing::debug;

use quad_rl_core::{Agent, Environment, EpisodeStats, Result};

/// Run one episode to completion.
///
/// Resets the environment and feeds every tick to the agent, sending back the
/// action it returns. The terminal tick is fed too, so the agent can close
/// its episode.
pub async fn run_episode<E, A>(env: &mut E, agent: &mut A) -> Result<EpisodeStats>
where
    E: Environment + ?Sized,
    A: Agent + ?Sized,
{
    let episode = agent.episode();
    let mut tick = env.reset().await?;
    let mut total_reward = 0.0;
    let mut steps = 0;

    loop {
        let action = agent.step(&tick.observation, tick.reward, tick.done)?;
        total_reward += tick.reward.value();
        steps += 1;
        if tick.done {
            break;
        }
        tick = env.step(&action).await?;
    }

    let stats = EpisodeStats {
        episode,
        total_reward,
        steps,
        epsilon: agent.exploration_rate(),
    };
    debug!(task = %env.task().name, ?stats, "episode complete");
    Ok(stats)
}

/// Run `episodes` episodes back to back
pub async fn run_episodes<E, A>(
    env: &mut E,
    agent: &mut A,
    episodes: usize,
) -> Result<Vec<EpisodeStats>>
where
    E: Environment + ?Sized,
    A: Agent + ?Sized,
{
    let mut all = Vec::with_capacity(episodes);
    for _ in 0..episodes {
        all.push(run_episode(env, agent).await?);
    }
    Ok(all)
}
