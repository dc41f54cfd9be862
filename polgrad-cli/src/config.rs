use anyhow::Result;
use candle_core::Device;
use clap::{ArgAction, Parser};
use polgrad_agents::{
    AgentKind, AgentType,
    builders::{A2CBuilder, PPOBuilder, ReinforceBuilder},
};
use polgrad_candle_lm::{
    learning_module::{CandleLearningModule, LearningModuleBuilder},
    networks::{NetBuilder, NetType},
    optimizer::{OptimizerConfig, OptimizerType},
};
use polgrad_core::{error::ConfigError, logger::LoggerHandle};
use polgrad_gym::{EnvType, GymEnv};
use std::path::PathBuf;

/// Policy gradient runner
#[derive(Parser, Debug, Clone)]
#[command(name = "polgrad", version)]
pub struct Args {
    /// Agent type, one of Reinforce, A2C, PPO
    pub agent: String,

    /// Environment name, one of CartPole-v1, LinearReward-v0
    pub environment: String,

    /// Net type, Shared or Separate
    #[arg(long = "net_type", default_value = "Shared")]
    pub net_type: String,

    /// Adam or SGD
    #[arg(long, default_value = "Adam")]
    pub optimizer: String,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Entropy regularization coefficient
    #[arg(long = "entropy_reg", default_value_t = 1e-2)]
    pub entropy_reg: f32,

    /// Discount factor, from 0.0 to 1.0
    #[arg(long, default_value_t = 0.99)]
    pub gamma: f32,

    #[arg(long, action = ArgAction::Set, default_value_t = false)]
    pub cuda: bool,

    /// Number of training iterations. With 0 the checkpoint is loaded instead.
    #[arg(long = "train_steps", default_value_t = 0)]
    pub train_steps: usize,

    /// Number of parallel environments, for A2C and PPO
    #[arg(long = "n_environments", default_value_t = 16)]
    pub n_environments: usize,

    /// Steps per environment in one rollout, for A2C and PPO
    #[arg(long = "rollout_len", default_value_t = 10)]
    pub rollout_len: usize,

    #[arg(long = "normalize_advantage", action = ArgAction::Set, default_value_t = true)]
    pub normalize_advantage: bool,

    /// Trajectories per PPO minibatch
    #[arg(long = "ppo_batch_size", default_value_t = 16)]
    pub ppo_batch_size: usize,

    #[arg(long = "num_ppo_epochs", default_value_t = 16)]
    pub num_ppo_epochs: usize,

    /// Clip range of the probability ratio
    #[arg(long = "ppo_eps", default_value_t = 0.1)]
    pub ppo_eps: f32,

    /// GAE lambda for PPO, from 0.0 to 1.0
    #[arg(long = "gae_lambda", default_value_t = 0.95)]
    pub gae_lambda: f32,

    /// Rollouts gathered before each PPO update
    #[arg(long = "num_rollouts", default_value_t = 1)]
    pub num_rollouts: usize,

    /// Width of the hidden layer
    #[arg(long, default_value_t = 128)]
    pub hidden: usize,

    #[arg(long = "max_grad_norm")]
    pub max_grad_norm: Option<f32>,

    /// Number of episodes to watch after training
    #[arg(long, default_value_t = 0)]
    pub watch: usize,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long = "checkpoint_dir", default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    #[arg(long = "log_dir", default_value = "logs")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentBuilder {
    Reinforce(ReinforceBuilder),
    A2C(A2CBuilder),
    PPO(PPOBuilder),
}

impl AgentBuilder {
    pub fn agent_type(&self) -> AgentType {
        match self {
            Self::Reinforce(_) => AgentType::Reinforce,
            Self::A2C(_) => AgentType::A2C,
            Self::PPO(_) => AgentType::PPO,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Reinforce(builder) => builder.validate(),
            Self::A2C(builder) => builder.validate(),
            Self::PPO(builder) => builder.validate(),
        }
    }

    fn normalizes_advantage(&self) -> bool {
        match self {
            Self::Reinforce(_) => false,
            Self::A2C(builder) => builder.normalize_advantage,
            Self::PPO(builder) => builder.normalize_advantage,
        }
    }

    pub fn build(
        &self,
        module: CandleLearningModule,
        env_type: EnvType,
        logger: LoggerHandle,
    ) -> anyhow::Result<AgentKind<CandleLearningModule, GymEnv>> {
        let env_builder = || -> anyhow::Result<GymEnv> { Ok(env_type.make()) };
        let agent = match self {
            Self::Reinforce(builder) => {
                AgentKind::Reinforce(builder.build(module, env_type.make(), logger)?)
            }
            Self::A2C(builder) => AgentKind::A2C(builder.build(module, env_builder, logger)?),
            Self::PPO(builder) => AgentKind::PPO(builder.build(module, env_builder, logger)?),
        };
        Ok(agent)
    }
}

/// A validated run. Nothing is allocated until [`RunConfig`] exists.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub env_type: EnvType,
    pub agent: AgentBuilder,
    pub learning_module: LearningModuleBuilder,
    pub cuda: bool,
    pub train_steps: usize,
    pub watch: usize,
    pub seed: Option<u64>,
    pub checkpoint_dir: PathBuf,
    log_root: PathBuf,
}

impl TryFrom<&Args> for RunConfig {
    type Error = ConfigError;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let agent_type: AgentType = args.agent.parse()?;
        let env_type: EnvType = args.environment.parse()?;
        let learning_module = LearningModuleBuilder {
            net: NetBuilder {
                net_type: args.net_type.parse::<NetType>()?,
                hidden: args.hidden,
            },
            optimizer: OptimizerConfig {
                optimizer_type: args.optimizer.parse::<OptimizerType>()?,
                lr: args.lr,
                max_grad_norm: args.max_grad_norm,
            },
        };
        learning_module.validate()?;

        let agent = match agent_type {
            AgentType::Reinforce => AgentBuilder::Reinforce(ReinforceBuilder {
                gamma: args.gamma,
                entropy_reg: args.entropy_reg,
            }),
            AgentType::A2C => AgentBuilder::A2C(A2CBuilder {
                gamma: args.gamma,
                entropy_reg: args.entropy_reg,
                n_environments: args.n_environments,
                rollout_len: args.rollout_len,
                normalize_advantage: args.normalize_advantage,
            }),
            AgentType::PPO => AgentBuilder::PPO(PPOBuilder {
                gamma: args.gamma,
                entropy_reg: args.entropy_reg,
                n_environments: args.n_environments,
                rollout_len: args.rollout_len,
                normalize_advantage: args.normalize_advantage,
                ppo_batch_size: args.ppo_batch_size,
                num_ppo_epochs: args.num_ppo_epochs,
                ppo_eps: args.ppo_eps,
                gae_lambda: Some(args.gae_lambda),
                num_rollouts: args.num_rollouts,
            }),
        };
        agent.validate()?;

        Ok(Self {
            env_type,
            agent,
            learning_module,
            cuda: args.cuda,
            train_steps: args.train_steps,
            watch: args.watch,
            seed: args.seed,
            checkpoint_dir: args.checkpoint_dir.clone(),
            log_root: args.log_dir.clone(),
        })
    }
}

impl RunConfig {
    /// `<log_dir>/<env>/<agent>`, suffixed with `_norm_A` when advantages are normalized.
    pub fn log_dir(&self) -> PathBuf {
        let agent_type = self.agent.agent_type();
        let mut run_name = agent_type.name().to_owned();
        if agent_type.uses_advantages() && self.agent.normalizes_advantage() {
            run_name.push_str("_norm_A");
        }
        self.log_root.join(self.env_type.name()).join(run_name)
    }

    pub fn device(&self) -> Result<Device> {
        if self.cuda {
            Ok(Device::new_cuda(0)?)
        } else {
            Ok(Device::Cpu)
        }
    }
}
