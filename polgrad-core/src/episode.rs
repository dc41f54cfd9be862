use crate::{
    env::Env,
    policies::PolicyValue,
    rng::{self, RNG},
    tensors::{Buffer, stack_observations},
    utils::rollout_buffer::{RolloutBuffer, Transition},
};
use anyhow::{Context, Result};
use rand::{Rng, SeedableRng, rngs::StdRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionSelection {
    #[default]
    Sample,
    Greedy,
}

struct Decision {
    action: usize,
    logp: f32,
    value: Option<f32>,
}

fn decide<P: PolicyValue + ?Sized, R: Rng>(
    policy: &P,
    state: &Buffer,
    selection: ActionSelection,
    rng: &mut R,
) -> Result<Decision> {
    let observation = stack_observations([state], policy.device())?;
    let output = policy.forward(&observation)?.detach();
    let distribution = output.distribution()?;
    let actions = match selection {
        ActionSelection::Sample => distribution.sample_with(rng)?,
        ActionSelection::Greedy => distribution.greedy()?,
    };
    let action = *actions.first().context("the policy returned no action")?;
    let logp: Vec<f32> = distribution.log_probs(&actions)?.to_vec1()?;
    let value = match &output.values {
        Some(values) => Some(values.to_vec1::<f32>()?[0]),
        None => None,
    };
    Ok(Decision {
        action,
        logp: logp[0],
        value,
    })
}

/// Plays a single episode to completion and returns its total reward. Only the given environment
/// is touched, the policy is used read-only. The reset and any sampled actions draw from a
/// generator seeded with `seed`, never from the thread local one that drives training.
pub fn play_episode<E: Env + ?Sized, P: PolicyValue + ?Sized>(
    env: &mut E,
    policy: &P,
    selection: ActionSelection,
    render: bool,
    seed: u64,
) -> Result<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut state = env.reset(seed)?;
    let mut total_reward = 0.;
    loop {
        if render {
            env.render()?;
        }
        let Decision { action, .. } = decide(policy, &state, selection, &mut rng)?;
        let snapshot = env.step(action)?;
        total_reward += snapshot.reward;
        if snapshot.done() {
            if render {
                env.render()?;
            }
            return Ok(total_reward);
        }
        state = snapshot.state;
    }
}

/// Runs one episode with sampled actions and records every step. The trajectory ends with the
/// step that terminated or truncated the episode.
pub fn collect_episode<E: Env + ?Sized, P: PolicyValue + ?Sized>(
    env: &mut E,
    policy: &P,
) -> Result<RolloutBuffer> {
    let mut buffer = RolloutBuffer::default();
    let mut state = env.reset(rng::random_seed())?;
    loop {
        let Decision {
            action,
            logp,
            value,
        } = RNG.with_borrow_mut(|rng| decide(policy, &state, ActionSelection::Sample, rng))?;
        let snapshot = env.step(action)?;
        let done = snapshot.done();
        buffer.push_step(Transition {
            observation: state,
            action,
            reward: snapshot.reward,
            done,
            value,
            logp,
        });
        state = snapshot.state;
        if done {
            buffer.set_last_state(state);
            return Ok(buffer);
        }
    }
}
