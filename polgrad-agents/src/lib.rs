pub mod a2c;
pub mod builders;
pub mod hooks;
pub mod losses;
pub mod ppo;
pub mod reinforce;

use a2c::A2C;
use anyhow::Result;
use polgrad_core::{agents::Agent, env::Env, error::ConfigError, policies::LearningModule};
use ppo::PPO;
use reinforce::Reinforce;
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentType {
    Reinforce,
    A2C,
    PPO,
}

impl AgentType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reinforce => "Reinforce",
            Self::A2C => "A2C",
            Self::PPO => "PPO",
        }
    }

    /// REINFORCE learns from whole episodes and has no use for a value baseline.
    pub fn uses_advantages(&self) -> bool {
        !matches!(self, Self::Reinforce)
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Reinforce" => Ok(Self::Reinforce),
            "A2C" => Ok(Self::A2C),
            "PPO" => Ok(Self::PPO),
            other => Err(ConfigError::UnknownAgent(other.to_owned())),
        }
    }
}

pub enum AgentKind<M: LearningModule, E: Env> {
    Reinforce(Reinforce<M, E>),
    A2C(A2C<M, E>),
    PPO(PPO<M, E>),
}

impl<M: LearningModule, E: Env> Agent for AgentKind<M, E> {
    type Module = M;

    fn module(&self) -> &Self::Module {
        match self {
            Self::Reinforce(agent) => agent.module(),
            Self::A2C(agent) => agent.module(),
            Self::PPO(agent) => agent.module(),
        }
    }

    fn module_mut(&mut self) -> &mut Self::Module {
        match self {
            Self::Reinforce(agent) => agent.module_mut(),
            Self::A2C(agent) => agent.module_mut(),
            Self::PPO(agent) => agent.module_mut(),
        }
    }

    fn train(&mut self, train_steps: usize) -> Result<()> {
        match self {
            Self::Reinforce(agent) => agent.train(train_steps),
            Self::A2C(agent) => agent.train(train_steps),
            Self::PPO(agent) => agent.train(train_steps),
        }
    }
}

#[cfg(test)]
mod test {
    use super::AgentType;
    use polgrad_core::error::ConfigError;

    #[test]
    fn agent_names_round_trip() {
        for agent in [AgentType::Reinforce, AgentType::A2C, AgentType::PPO] {
            assert_eq!(agent.name().parse::<AgentType>(), Ok(agent));
        }
        assert_eq!(
            "DQN".parse::<AgentType>(),
            Err(ConfigError::UnknownAgent("DQN".to_owned()))
        );
    }
}
