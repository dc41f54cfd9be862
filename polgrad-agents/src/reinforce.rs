use crate::{
    hooks::{BatchStats, EmptyHooks, LearningHooks, process_hook_result},
    losses::{mean_entropy, policy_gradient_loss, total_loss},
};
use anyhow::Result;
use candle_core::Tensor;
use log::debug;
use polgrad_core::{
    agents::Agent,
    env::Env,
    episode::collect_episode,
    logger::LoggerHandle,
    policies::LearningModule,
    tensors::stack_observations,
    utils::{advantages::discounted_returns, rollout_buffer::RolloutBuffer},
};

/// Monte-Carlo policy gradient. One iteration plays one full episode and takes one optimizer
/// step on it.
pub struct Reinforce<M: LearningModule, E: Env> {
    pub module: M,
    pub env: E,
    pub hooks: Box<dyn LearningHooks>,
    pub gamma: f32,
    pub entropy_reg: f32,
    logger: LoggerHandle,
    updates: usize,
}

impl<M: LearningModule, E: Env> Reinforce<M, E> {
    pub fn new(module: M, env: E, gamma: f32, entropy_reg: f32, logger: LoggerHandle) -> Self {
        Self {
            module,
            env,
            hooks: Box::new(EmptyHooks),
            gamma,
            entropy_reg,
            logger,
            updates: 0,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn LearningHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// One optimizer step on a complete episode.
    pub fn learn(&mut self, episode: &RolloutBuffer, iteration: usize) -> Result<BatchStats> {
        let device = self.module.device().clone();
        let returns = discounted_returns(&episode.rewards, &episode.dones, 0., self.gamma)?;
        let returns = Tensor::from_vec(returns, episode.len(), &device)?;
        let states = stack_observations(&episode.states, &device)?;
        let output = self.module.forward(&states)?;
        let distribution = output.distribution()?;
        let logps = distribution.log_probs(&episode.actions)?;
        let policy_loss = policy_gradient_loss(&logps, &returns)?;
        let entropy = mean_entropy(&distribution.entropy()?)?;
        let loss = total_loss(&policy_loss, None, &entropy, self.entropy_reg)?;
        self.module.backward_step(&loss)?;
        self.updates += 1;
        let stats = BatchStats {
            iteration,
            update: self.updates,
            policy_loss: policy_loss.to_scalar()?,
            value_loss: None,
            entropy: entropy.to_scalar()?,
            loss: loss.to_scalar()?,
        };
        stats.log(self.logger.as_ref());
        Ok(stats)
    }

    fn train_loop(&mut self, train_steps: usize) -> Result<()> {
        for iteration in 0..train_steps {
            let episode = collect_episode(&mut self.env, &self.module)?;
            let episode_reward = episode.total_reward();
            self.logger
                .log_scalar("episode_reward", episode_reward, self.updates + 1);
            let stats = self.learn(&episode, iteration)?;
            debug!(
                "iteration {iteration}: episode reward {episode_reward}, length {}, loss {:.4}",
                episode.len(),
                stats.loss
            );
            process_hook_result!(self.hooks.batch_hook(&stats));
            process_hook_result!(self.hooks.iteration_hook(iteration));
        }
        Ok(())
    }
}

impl<M: LearningModule, E: Env> Agent for Reinforce<M, E> {
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
