pub mod cartpole;
pub mod linear_reward;

use anyhow::Result;
use cartpole::CartPole;
use linear_reward::LinearReward;
use log::debug;
use polgrad_core::{
    env::{Env, EnvironmentDescription, SnapShot},
    error::ConfigError,
    tensors::Buffer,
};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvType {
    CartPole,
    LinearReward,
}

impl EnvType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CartPole => "CartPole-v1",
            Self::LinearReward => "LinearReward-v0",
        }
    }

    pub fn make(&self) -> GymEnv {
        debug!("building {self}");
        match self {
            Self::CartPole => GymEnv::CartPole(CartPole::default()),
            Self::LinearReward => GymEnv::LinearReward(LinearReward::default()),
        }
    }
}

impl fmt::Display for EnvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EnvType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CartPole-v1" => Ok(Self::CartPole),
            "LinearReward-v0" => Ok(Self::LinearReward),
            other => Err(ConfigError::UnknownEnvironment(other.to_owned())),
        }
    }
}

/// Every environment this crate ships.
#[derive(Debug, Clone)]
pub enum GymEnv {
    CartPole(CartPole),
    LinearReward(LinearReward),
}

impl Env for GymEnv {
    fn reset(&mut self, seed: u64) -> Result<Buffer> {
        match self {
            Self::CartPole(env) => env.reset(seed),
            Self::LinearReward(env) => env.reset(seed),
        }
    }

    fn step(&mut self, action: usize) -> Result<SnapShot> {
        match self {
            Self::CartPole(env) => env.step(action),
            Self::LinearReward(env) => env.step(action),
        }
    }

    fn env_description(&self) -> EnvironmentDescription {
        match self {
            Self::CartPole(env) => env.env_description(),
            Self::LinearReward(env) => env.env_description(),
        }
    }

    fn render(&mut self) -> Result<()> {
        match self {
            Self::CartPole(env) => env.render(),
            Self::LinearReward(env) => env.render(),
        }
    }
}

/// Builds the environment registered under `name`.
pub fn make_env(name: &str) -> std::result::Result<GymEnv, ConfigError> {
    Ok(name.parse::<EnvType>()?.make())
}
