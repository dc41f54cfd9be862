use crate::{
    a2c::A2C,
    ppo::{PPO, PPOParams},
    reinforce::Reinforce,
};
use anyhow::Result;
use polgrad_core::{
    env::Env,
    env_pool::EnvPool,
    error::{ConfigError, check_count, check_discount, check_gae_lambda},
    logger::LoggerHandle,
    policies::LearningModule,
    utils::advantages::AdvantageEstimator,
};

fn check_critic<M: LearningModule>(module: &M, agent: &'static str) -> Result<(), ConfigError> {
    if module.has_critic() {
        Ok(())
    } else {
        Err(ConfigError::MissingCritic { agent })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReinforceBuilder {
    pub gamma: f32,
    pub entropy_reg: f32,
}

impl Default for ReinforceBuilder {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            entropy_reg: 1e-2,
        }
    }
}

impl ReinforceBuilder {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_discount(self.gamma)
    }

    pub fn build<M: LearningModule, E: Env>(
        &self,
        module: M,
        env: E,
        logger: LoggerHandle,
    ) -> Result<Reinforce<M, E>> {
        self.validate()?;
        Ok(Reinforce::new(
            module,
            env,
            self.gamma,
            self.entropy_reg,
            logger,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct A2CBuilder {
    pub gamma: f32,
    pub entropy_reg: f32,
    pub n_environments: usize,
    pub rollout_len: usize,
    pub normalize_advantage: bool,
}

impl Default for A2CBuilder {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            entropy_reg: 1e-2,
            n_environments: 16,
            rollout_len: 10,
            normalize_advantage: true,
        }
    }
}

impl A2CBuilder {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_discount(self.gamma)?;
        check_count("n_environments", self.n_environments)?;
        check_count("rollout_len", self.rollout_len)
    }

    /// Validates the configuration and the module, then builds `n_environments` environments
    /// with `env_builder`.
    pub fn build<M: LearningModule, E: Env>(
        &self,
        module: M,
        env_builder: impl Fn() -> Result<E>,
        logger: LoggerHandle,
    ) -> Result<A2C<M, E>> {
        self.validate()?;
        check_critic(&module, "A2C")?;
        let env_pool = EnvPool::from_builder(env_builder, self.n_environments, logger.clone())?;
        Ok(A2C::new(
            module,
            env_pool,
            self.gamma,
            self.entropy_reg,
            self.rollout_len,
            self.normalize_advantage,
            logger,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PPOBuilder {
    pub gamma: f32,
    pub entropy_reg: f32,
    pub n_environments: usize,
    pub rollout_len: usize,
    pub normalize_advantage: bool,
    pub ppo_batch_size: usize,
    pub num_ppo_epochs: usize,
    pub ppo_eps: f32,
    /// GAE is used when set, plain `R - V` advantages otherwise.
    pub gae_lambda: Option<f32>,
    pub num_rollouts: usize,
}

impl Default for PPOBuilder {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            entropy_reg: 1e-2,
            n_environments: 16,
            rollout_len: 10,
            normalize_advantage: true,
            ppo_batch_size: 16,
            num_ppo_epochs: 16,
            ppo_eps: 0.1,
            gae_lambda: Some(0.95),
            num_rollouts: 1,
        }
    }
}

impl PPOBuilder {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_discount(self.gamma)?;
        check_count("n_environments", self.n_environments)?;
        check_count("rollout_len", self.rollout_len)?;
        check_count("ppo_batch_size", self.ppo_batch_size)?;
        check_count("num_ppo_epochs", self.num_ppo_epochs)?;
        check_count("num_rollouts", self.num_rollouts)?;
        if !(self.ppo_eps > 0. && self.ppo_eps < 1.) {
            return Err(ConfigError::InvalidClipEpsilon(self.ppo_eps));
        }
        if let Some(lambda) = self.gae_lambda {
            check_gae_lambda(lambda)?;
        }
        Ok(())
    }

    pub fn params(&self) -> PPOParams {
        PPOParams {
            clip_eps: self.ppo_eps,
            ppo_batch_size: self.ppo_batch_size,
            num_ppo_epochs: self.num_ppo_epochs,
            num_rollouts: self.num_rollouts,
            estimator: AdvantageEstimator::from_lambda(self.gae_lambda),
        }
    }

    pub fn build<M: LearningModule, E: Env>(
        &self,
        module: M,
        env_builder: impl Fn() -> Result<E>,
        logger: LoggerHandle,
    ) -> Result<PPO<M, E>> {
        self.validate()?;
        check_critic(&module, "PPO")?;
        let env_pool = EnvPool::from_builder(env_builder, self.n_environments, logger.clone())?;
        Ok(PPO::new(
            module,
            env_pool,
            self.gamma,
            self.entropy_reg,
            self.rollout_len,
            self.normalize_advantage,
            self.params(),
            logger,
        ))
    }
}

#[cfg(test)]
mod test {
    use super::{A2CBuilder, PPOBuilder, ReinforceBuilder};
    use polgrad_core::error::ConfigError;

    #[test]
    fn defaults_are_valid() {
        assert!(ReinforceBuilder::default().validate().is_ok());
        assert!(A2CBuilder::default().validate().is_ok());
        assert!(PPOBuilder::default().validate().is_ok());
    }

    #[test]
    fn discount_out_of_range() {
        let builder = ReinforceBuilder {
            gamma: 1.5,
            ..Default::default()
        };
        assert_eq!(builder.validate(), Err(ConfigError::InvalidDiscount(1.5)));
        let builder = A2CBuilder {
            gamma: -0.5,
            ..Default::default()
        };
        assert_eq!(builder.validate(), Err(ConfigError::InvalidDiscount(-0.5)));
    }

    #[test]
    fn ppo_epsilon_must_be_a_proper_fraction() {
        for ppo_eps in [0., 1., -0.1, 2.] {
            let builder = PPOBuilder {
                ppo_eps,
                ..Default::default()
            };
            assert_eq!(builder.validate(), Err(ConfigError::InvalidClipEpsilon(ppo_eps)));
        }
    }

    #[test]
    fn gae_lambda_out_of_range() {
        let builder = PPOBuilder {
            gae_lambda: Some(10.),
            ..Default::default()
        };
        assert_eq!(builder.validate(), Err(ConfigError::InvalidGaeLambda(10.)));
        let builder = PPOBuilder {
            gae_lambda: None,
            ..Default::default()
        };
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn zero_counts() {
        let builder = PPOBuilder {
            ppo_batch_size: 0,
            ..Default::default()
        };
        assert_eq!(
            builder.validate(),
            Err(ConfigError::ZeroCount {
                name: "ppo_batch_size"
            })
        );
        let builder = A2CBuilder {
            n_environments: 0,
            ..Default::default()
        };
        assert!(builder.validate().is_err());
    }
}
