use thiserror::Error;

/// Invalid hyperparameters or names, detected before any environment or network is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("discount factor gamma must be within [0, 1], got {0}")]
    InvalidDiscount(f32),
    #[error("gae lambda must be within [0, 1], got {0}")]
    InvalidGaeLambda(f32),
    #[error("ppo clip epsilon must be within (0, 1), got {0}")]
    InvalidClipEpsilon(f32),
    #[error("learning rate must be positive and finite, got {0}")]
    InvalidLearningRate(f64),
    #[error("max gradient norm must be positive, got {0}")]
    InvalidMaxGradNorm(f32),
    #[error("{name} must be at least 1")]
    ZeroCount { name: &'static str },
    #[error("unknown agent `{0}`, expected one of Reinforce, A2C, PPO")]
    UnknownAgent(String),
    #[error("unknown environment `{0}`, expected one of CartPole-v1, LinearReward-v0")]
    UnknownEnvironment(String),
    #[error("unknown optimizer `{0}`, expected Adam or SGD")]
    UnknownOptimizer(String),
    #[error("unknown net type `{0}`, expected Shared or Separate")]
    UnknownNetType(String),
    #[error("{agent} needs a network with a value head")]
    MissingCritic { agent: &'static str },
    #[error("only discrete action spaces are supported")]
    UnsupportedActionSpace,
}

pub fn check_discount(gamma: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&gamma) {
        Ok(())
    } else {
        Err(ConfigError::InvalidDiscount(gamma))
    }
}

pub fn check_gae_lambda(lambda: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&lambda) {
        Ok(())
    } else {
        Err(ConfigError::InvalidGaeLambda(lambda))
    }
}

pub fn check_count(name: &'static str, count: usize) -> Result<(), ConfigError> {
    if count == 0 {
        Err(ConfigError::ZeroCount { name })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{ConfigError, check_count, check_discount, check_gae_lambda};

    #[test]
    fn discount_bounds() {
        assert!(check_discount(0.0).is_ok());
        assert!(check_discount(1.0).is_ok());
        assert_eq!(check_discount(1.5), Err(ConfigError::InvalidDiscount(1.5)));
        assert!(check_discount(-0.1).is_err());
        assert!(check_discount(f32::NAN).is_err());
    }

    #[test]
    fn lambda_bounds() {
        assert!(check_gae_lambda(0.95).is_ok());
        assert_eq!(check_gae_lambda(10.), Err(ConfigError::InvalidGaeLambda(10.)));
    }

    #[test]
    fn zero_counts_are_rejected() {
        let err = check_count("rollout_len", 0).unwrap_err();
        assert_eq!(err.to_string(), "rollout_len must be at least 1");
        assert!(check_count("rollout_len", 1).is_ok());
    }
}
