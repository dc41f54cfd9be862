use crate::{
    env::{Env, EnvironmentDescription, SnapShot},
    error::ConfigError,
    logger::LoggerHandle,
    policies::PolicyValue,
    rng,
    tensors::{Buffer, stack_observations},
    utils::rollout_buffer::{RolloutBatch, RolloutBuffer, Transition},
};
use anyhow::{Context, Result, ensure};
use log::{debug, warn};

/// Result of stepping every environment of the pool once.
#[derive(Debug, Clone)]
pub struct PoolStep {
    /// Observation to act on next. For slots whose episode just ended this is the first
    /// observation of the new episode.
    pub observations: Vec<Buffer>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
}

/// A fixed number of environments stepped in lock-step. Finished episodes are reset in place, so
/// the pool always holds a live observation for every slot.
pub struct EnvPool<E: Env> {
    envs: Vec<E>,
    observations: Option<Vec<Buffer>>,
    episode_rewards: Vec<f32>,
    episode_lengths: Vec<usize>,
    completed_episodes: usize,
    logger: LoggerHandle,
    closed: bool,
}

impl<E: Env> EnvPool<E> {
    pub fn new(envs: Vec<E>, logger: LoggerHandle) -> Result<Self> {
        if envs.is_empty() {
            return Err(ConfigError::ZeroCount {
                name: "n_environments",
            }
            .into());
        }
        let n_envs = envs.len();
        Ok(Self {
            envs,
            observations: None,
            episode_rewards: vec![0.; n_envs],
            episode_lengths: vec![0; n_envs],
            completed_episodes: 0,
            logger,
            closed: false,
        })
    }

    pub fn from_builder(
        builder: impl Fn() -> Result<E>,
        n_envs: usize,
        logger: LoggerHandle,
    ) -> Result<Self> {
        crate::error::check_count("n_environments", n_envs)?;
        let envs = (0..n_envs).map(|_| builder()).collect::<Result<Vec<_>>>()?;
        Self::new(envs, logger)
    }

    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn env_description(&self) -> EnvironmentDescription {
        self.envs[0].env_description()
    }

    pub fn completed_episodes(&self) -> usize {
        self.completed_episodes
    }

    /// Current observation of every slot, `None` before the first reset.
    pub fn observations(&self) -> Option<&[Buffer]> {
        self.observations.as_deref()
    }

    pub fn reset(&mut self) -> Result<Vec<Buffer>> {
        let observations = self
            .envs
            .iter_mut()
            .map(|env| env.reset(rng::random_seed()))
            .collect::<Result<Vec<_>>>()?;
        self.episode_rewards.fill(0.);
        self.episode_lengths.fill(0);
        self.observations = Some(observations.clone());
        Ok(observations)
    }

    pub fn step(&mut self, actions: &[usize]) -> Result<PoolStep> {
        let current = self
            .observations
            .as_mut()
            .context("the environment pool has to be reset before stepping")?;
        ensure!(
            actions.len() == self.envs.len(),
            "expected {} actions, got {}",
            self.envs.len(),
            actions.len()
        );
        let mut rewards = Vec::with_capacity(actions.len());
        let mut dones = Vec::with_capacity(actions.len());
        for (idx, (env, action)) in self.envs.iter_mut().zip(actions).enumerate() {
            let snapshot = env.step(*action)?;
            let done = snapshot.done();
            let SnapShot { state, reward, .. } = snapshot;
            self.episode_rewards[idx] += reward;
            self.episode_lengths[idx] += 1;
            current[idx] = if done {
                self.completed_episodes += 1;
                let episode_reward = self.episode_rewards[idx];
                let episode_length = self.episode_lengths[idx];
                debug!(
                    "episode {} finished in slot {idx}: reward {episode_reward}, length {episode_length}",
                    self.completed_episodes
                );
                self.logger
                    .log_scalar("episode_reward", episode_reward, self.completed_episodes);
                self.logger.log_scalar(
                    "episode_length",
                    episode_length as f32,
                    self.completed_episodes,
                );
                self.episode_rewards[idx] = 0.;
                self.episode_lengths[idx] = 0;
                env.reset(rng::random_seed())?
            } else {
                state
            };
            rewards.push(reward);
            dones.push(done);
        }
        Ok(PoolStep {
            observations: current.clone(),
            rewards,
            dones,
        })
    }

    /// Collects `rollout_len` steps from every environment, sampling actions from `policy`.
    pub fn collect_rollout<P: PolicyValue + ?Sized>(
        &mut self,
        policy: &P,
        rollout_len: usize,
    ) -> Result<RolloutBatch> {
        crate::error::check_count("rollout_len", rollout_len)?;
        if self.observations.is_none() {
            self.reset()?;
        }
        let mut trajectories = vec![RolloutBuffer::default(); self.num_envs()];
        for _ in 0..rollout_len {
            let observations = self
                .observations
                .clone()
                .context("the environment pool has no observations")?;
            let states = stack_observations(&observations, policy.device())?;
            let output = policy.forward(&states)?.detach();
            let distribution = output.distribution()?;
            let actions = distribution.sample()?;
            let logps: Vec<f32> = distribution.log_probs(&actions)?.to_vec1()?;
            let values: Option<Vec<f32>> = output
                .values
                .as_ref()
                .map(|values| values.to_vec1())
                .transpose()?;
            let PoolStep { rewards, dones, .. } = self.step(&actions)?;
            for (idx, (trajectory, observation)) in
                trajectories.iter_mut().zip(observations).enumerate()
            {
                trajectory.push_step(Transition {
                    observation,
                    action: actions[idx],
                    reward: rewards[idx],
                    done: dones[idx],
                    value: values.as_ref().map(|values| values[idx]),
                    logp: logps[idx],
                });
            }
        }
        let last_states = self
            .observations
            .as_ref()
            .context("the environment pool has no observations")?;
        for (trajectory, state) in trajectories.iter_mut().zip(last_states) {
            trajectory.set_last_state(state.clone());
        }
        RolloutBatch::new(trajectories)
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        for env in self.envs.iter_mut() {
            env.close()?;
        }
        Ok(())
    }
}

impl<E: Env> Drop for EnvPool<E> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!("failed to close environment: {err}");
        }
    }
}
