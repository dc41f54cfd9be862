use crate::{
    hooks::{BatchStats, EmptyHooks, HookResult, LearningHooks, process_hook_result},
    losses::{
        clip_fraction, clipped_surrogate, mean_and_std, mean_entropy, total_loss, value_loss,
    },
};
use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use log::debug;
use polgrad_core::{
    agents::Agent,
    env::Env,
    env_pool::EnvPool,
    logger::LoggerHandle,
    policies::{LearningModule, estimate_values},
    rng::RNG,
    tensors::stack_observations,
    utils::{
        advantages::{AdvantageEstimator, Advantages, Returns, calculate_advantages_and_returns},
        rollout_buffer::RolloutBatch,
    },
};
use rand::seq::SliceRandom;

/// Hyperparameters specific to the clipped update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PPOParams {
    pub clip_eps: f32,
    pub ppo_batch_size: usize,
    pub num_ppo_epochs: usize,
    pub num_rollouts: usize,
    pub estimator: AdvantageEstimator,
}

/// Tensors of a group of whole trajectories, flattened in `(trajectory, step)` order.
struct Minibatch {
    observations: Tensor,
    actions: Vec<usize>,
    logp_old: Tensor,
    advantages: Tensor,
    returns: Tensor,
}

impl Minibatch {
    fn new(
        batch: &RolloutBatch,
        advantages: &Advantages,
        returns: &Returns,
        trajectories: &[usize],
        device: &Device,
    ) -> Result<Self> {
        let observations = stack_observations(
            trajectories.iter().flat_map(|&idx| batch[idx].states.iter()),
            device,
        )?;
        let actions: Vec<usize> = trajectories
            .iter()
            .flat_map(|&idx| batch[idx].actions.iter().copied())
            .collect();
        let len = actions.len();
        let gather = |source: &dyn Fn(usize) -> Vec<f32>| -> Result<Tensor> {
            let data: Vec<f32> = trajectories.iter().flat_map(|&idx| source(idx)).collect();
            Ok(Tensor::from_vec(data, len, device)?)
        };
        Ok(Self {
            observations,
            logp_old: gather(&|idx| batch[idx].logps.clone())?,
            advantages: gather(&|idx| advantages[idx].clone())?,
            returns: gather(&|idx| returns[idx].clone())?,
            actions,
        })
    }
}

/// Proximal policy optimization with the clipped surrogate objective. Every iteration collects
/// `num_rollouts` rollouts and then runs `num_ppo_epochs` passes of minibatch updates over them.
pub struct PPO<M: LearningModule, E: Env> {
    pub module: M,
    pub env_pool: EnvPool<E>,
    pub hooks: Box<dyn LearningHooks>,
    pub gamma: f32,
    pub entropy_reg: f32,
    pub rollout_len: usize,
    pub normalize_advantage: bool,
    pub params: PPOParams,
    logger: LoggerHandle,
    updates: usize,
}

impl<M: LearningModule, E: Env> PPO<M, E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        module: M,
        env_pool: EnvPool<E>,
        gamma: f32,
        entropy_reg: f32,
        rollout_len: usize,
        normalize_advantage: bool,
        params: PPOParams,
        logger: LoggerHandle,
    ) -> Self {
        Self {
            module,
            env_pool,
            hooks: Box::new(EmptyHooks),
            gamma,
            entropy_reg,
            rollout_len,
            normalize_advantage,
            params,
            logger,
            updates: 0,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn LearningHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    fn update(&mut self, minibatch: &Minibatch, iteration: usize) -> Result<BatchStats> {
        let output = self.module.forward(&minibatch.observations)?;
        let distribution = output.distribution()?;
        let logp = distribution.log_probs(&minibatch.actions)?;
        let logp_diff = logp.sub(&minibatch.logp_old)?;
        let ratio = logp_diff.exp()?;
        let policy_loss = clipped_surrogate(&ratio, &minibatch.advantages, self.params.clip_eps)?;
        let value_loss = value_loss(output.values()?, &minibatch.returns)?;
        let entropy = mean_entropy(&distribution.entropy()?)?;
        let loss = total_loss(&policy_loss, Some(&value_loss), &entropy, self.entropy_reg)?;

        let ratios: Vec<f32> = ratio.detach().to_vec1()?;
        let clip_fraction = clip_fraction(&ratios, self.params.clip_eps);
        let approx_kl = logp_diff.detach().neg()?.mean_all()?.to_scalar::<f32>()?;

        self.module.backward_step(&loss)?;
        self.updates += 1;
        let stats = BatchStats {
            iteration,
            update: self.updates,
            policy_loss: policy_loss.to_scalar()?,
            value_loss: Some(value_loss.to_scalar()?),
            entropy: entropy.to_scalar()?,
            loss: loss.to_scalar()?,
        };
        stats.log(self.logger.as_ref());
        self.logger
            .log_scalar("clip_fraction", clip_fraction, self.updates);
        self.logger.log_scalar("approx_kl", approx_kl, self.updates);
        Ok(stats)
    }

    /// Advantages and value targets of `batch`, from the values recorded during collection and a
    /// bootstrap of each trajectory's last state.
    fn targets(&self, batch: &RolloutBatch) -> Result<(Advantages, Returns)> {
        let values = batch
            .iter()
            .map(|trajectory| {
                trajectory
                    .recorded_values()
                    .context("PPO needs the value estimates recorded during collection")
            })
            .collect::<Result<Vec<_>>>()?;
        let bootstrap = estimate_values(&self.module, batch.last_states()?)?;
        let (mut advantages, returns) = calculate_advantages_and_returns(
            batch,
            &values,
            &bootstrap,
            self.gamma,
            self.params.estimator,
        )?;
        if self.normalize_advantage {
            advantages.normalize();
        }
        Ok((advantages, returns))
    }

    /// Runs every epoch of minibatch updates over `batch`. Targets and old log probabilities are
    /// taken once, before the first update.
    pub fn learn(&mut self, batch: &RolloutBatch, iteration: usize) -> Result<HookResult> {
        let device = self.module.device().clone();
        let (advantages, returns) = self.targets(batch)?;
        let (advantage_mean, advantage_std) = mean_and_std(&advantages.flatten());
        self.logger
            .log_scalar("advantage_mean", advantage_mean, self.updates + 1);
        self.logger
            .log_scalar("advantage_std", advantage_std, self.updates + 1);

        let mut order: Vec<usize> = (0..batch.len()).collect();
        for epoch in 0..self.params.num_ppo_epochs {
            RNG.with_borrow_mut(|rng| order.shuffle(rng));
            for trajectories in order.chunks(self.params.ppo_batch_size) {
                let minibatch =
                    Minibatch::new(batch, &advantages, &returns, trajectories, &device)?;
                let stats = self.update(&minibatch, iteration)?;
                debug!(
                    "iteration {iteration} epoch {epoch}: policy loss {:.4}, loss {:.4}",
                    stats.policy_loss, stats.loss
                );
                process_hook_result!(self.hooks.batch_hook(&stats), HookResult::Break);
            }
        }
        Ok(HookResult::Continue)
    }

    fn train_loop(&mut self, train_steps: usize) -> Result<()> {
        for iteration in 0..train_steps {
            let batches = (0..self.params.num_rollouts)
                .map(|_| {
                    self.env_pool
                        .collect_rollout(&self.module, self.rollout_len)
                })
                .collect::<Result<Vec<_>>>()?;
            let batch = RolloutBatch::concat(batches)?;
            process_hook_result!(self.learn(&batch, iteration));
            process_hook_result!(self.hooks.iteration_hook(iteration));
        }
        Ok(())
    }
}

impl<M: LearningModule, E: Env> Agent for PPO<M, E> {
    type Module = M;

    fn module(&self) -> &Self::Module {
        &self.module
    }

    fn module_mut(&mut self) -> &mut Self::Module {
        &mut self.module
    }

    fn train(&mut self, train_steps: usize) -> Result<()> {
        let result = self.train_loop(train_steps);
        self.logger.flush();
        result
    }
}
