use crate::{
    hooks::{BatchStats, EmptyHooks, LearningHooks, process_hook_result},
    losses::{mean_and_std, mean_entropy, policy_gradient_loss, total_loss, value_loss},
};
use anyhow::Result;
use candle_core::Tensor;
use log::debug;
use polgrad_core::{
    agents::Agent,
    env::Env,
    env_pool::EnvPool,
    logger::LoggerHandle,
    policies::{LearningModule, estimate_values},
    tensors::stack_observations,
    utils::{
        advantages::{AdvantageEstimator, calculate_advantages_and_returns},
        rollout_buffer::RolloutBatch,
    },
};

/// Synchronous advantage actor-critic. Every iteration collects one rollout from the pool and
/// takes a single optimizer step on it.
pub struct A2C<M: LearningModule, E: Env> {
    pub module: M,
    pub env_pool: EnvPool<E>,
    pub hooks: Box<dyn LearningHooks>,
    pub gamma: f32,
    pub entropy_reg: f32,
    pub rollout_len: usize,
    pub normalize_advantage: bool,
    logger: LoggerHandle,
    updates: usize,
}

impl<M: LearningModule, E: Env> A2C<M, E> {
    pub fn new(
        module: M,
        env_pool: EnvPool<E>,
        gamma: f32,
        entropy_reg: f32,
        rollout_len: usize,
        normalize_advantage: bool,
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
            logger,
            updates: 0,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn LearningHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn learn(&mut self, batch: &RolloutBatch, iteration: usize) -> Result<BatchStats> {
        let device = self.module.device().clone();
        let (_, steps) = batch.shape();
        let num_steps = batch.num_steps();
        let bootstrap = estimate_values(&self.module, batch.last_states()?)?;

        let states = stack_observations(batch.observations(), &device)?;
        let output = self.module.forward(&states)?;
        let values = output.values()?;
        let values_detached: Vec<f32> = values.detach().to_vec1()?;
        let values_detached: Vec<Vec<f32>> =
            values_detached.chunks(steps).map(<[f32]>::to_vec).collect();
        let (mut advantages, returns) = calculate_advantages_and_returns(
            batch,
            &values_detached,
            &bootstrap,
            self.gamma,
            AdvantageEstimator::MonteCarlo,
        )?;
        if self.normalize_advantage {
            advantages.normalize();
        }
        let advantages = advantages.flatten();
        let (advantage_mean, advantage_std) = mean_and_std(&advantages);
        let advantages = Tensor::from_vec(advantages, num_steps, &device)?;
        let returns = Tensor::from_vec(returns.flatten(), num_steps, &device)?;

        let distribution = output.distribution()?;
        let logps = distribution.log_probs(&batch.actions())?;
        let policy_loss = policy_gradient_loss(&logps, &advantages)?;
        let value_loss = value_loss(values, &returns)?;
        let entropy = mean_entropy(&distribution.entropy()?)?;
        let loss = total_loss(&policy_loss, Some(&value_loss), &entropy, self.entropy_reg)?;
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
            .log_scalar("advantage_mean", advantage_mean, self.updates);
        self.logger
            .log_scalar("advantage_std", advantage_std, self.updates);
        Ok(stats)
    }

    fn train_loop(&mut self, train_steps: usize) -> Result<()> {
        for iteration in 0..train_steps {
            let batch = self
                .env_pool
                .collect_rollout(&self.module, self.rollout_len)?;
            let stats = self.learn(&batch, iteration)?;
            debug!(
                "iteration {iteration}: policy loss {:.4}, value loss {:.4}",
                stats.policy_loss,
                stats.value_loss.unwrap_or_default()
            );
            process_hook_result!(self.hooks.batch_hook(&stats));
            process_hook_result!(self.hooks.iteration_hook(iteration));
        }
        Ok(())
    }
}

impl<M: LearningModule, E: Env> Agent for A2C<M, E> {
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
