use crate::sequential::{Sequential, build_sequential};
use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder, linear};
use enum_dispatch::enum_dispatch;
use polgrad_core::{
    env::{EnvironmentDescription, Space},
    error::{ConfigError, check_count},
};
use std::str::FromStr;

#[enum_dispatch]
pub trait Network {
    /// `(logits, values)` for a batch of observations. Values have shape `(batch,)`.
    fn forward_heads(&self, xs: &Tensor) -> Result<(Tensor, Option<Tensor>)>;

    fn has_critic(&self) -> bool;
}

/// One hidden layer shared by a policy head and a value head.
#[derive(Debug, Clone)]
pub struct DenseShared {
    trunk: Sequential,
    policy_head: Linear,
    value_head: Linear,
}

impl DenseShared {
    pub fn new(obs_size: usize, hidden: usize, n_actions: usize, vb: &VarBuilder) -> Result<Self> {
        let trunk = build_sequential(obs_size, &[hidden], vb, "trunk")?;
        let policy_head = linear(hidden, n_actions, vb.pp("policy_head"))?;
        let value_head = linear(hidden, 1, vb.pp("value_head"))?;
        Ok(Self {
            trunk,
            policy_head,
            value_head,
        })
    }
}

impl Network for DenseShared {
    fn forward_heads(&self, xs: &Tensor) -> Result<(Tensor, Option<Tensor>)> {
        let hidden = self.trunk.forward(xs)?.relu()?;
        let logits = self.policy_head.forward(&hidden)?;
        let values = self.value_head.forward(&hidden)?.squeeze(1)?;
        Ok((logits, Some(values)))
    }

    fn has_critic(&self) -> bool {
        true
    }
}

/// Independent actor and critic networks.
#[derive(Debug, Clone)]
pub struct DenseSeparate {
    actor: Sequential,
    critic: Sequential,
}

impl DenseSeparate {
    pub fn new(obs_size: usize, hidden: usize, n_actions: usize, vb: &VarBuilder) -> Result<Self> {
        let actor = build_sequential(obs_size, &[hidden, n_actions], vb, "actor")?;
        let critic = build_sequential(obs_size, &[hidden, 1], vb, "critic")?;
        Ok(Self { actor, critic })
    }
}

impl Network for DenseSeparate {
    fn forward_heads(&self, xs: &Tensor) -> Result<(Tensor, Option<Tensor>)> {
        let logits = self.actor.forward(xs)?;
        let values = self.critic.forward(xs)?.squeeze(1)?;
        Ok((logits, Some(values)))
    }

    fn has_critic(&self) -> bool {
        true
    }
}

#[enum_dispatch(Network)]
#[derive(Debug, Clone)]
pub enum NetKind {
    DenseShared(DenseShared),
    DenseSeparate(DenseSeparate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetType {
    #[default]
    Shared,
    Separate,
}

impl FromStr for NetType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Shared" => Ok(Self::Shared),
            "Separate" => Ok(Self::Separate),
            other => Err(ConfigError::UnknownNetType(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetBuilder {
    pub net_type: NetType,
    pub hidden: usize,
}

impl Default for NetBuilder {
    fn default() -> Self {
        Self {
            net_type: NetType::Shared,
            hidden: 128,
        }
    }
}

impl NetBuilder {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_count("hidden", self.hidden)
    }

    pub fn build(
        &self,
        env_description: &EnvironmentDescription,
        vb: &VarBuilder,
    ) -> anyhow::Result<NetKind> {
        self.validate()?;
        let Space::Discrete(n_actions) = env_description.action_space else {
            return Err(ConfigError::UnsupportedActionSpace.into());
        };
        let obs_size = env_description.observation_size();
        let net = match self.net_type {
            NetType::Shared => DenseShared::new(obs_size, self.hidden, n_actions, vb)?.into(),
            NetType::Separate => DenseSeparate::new(obs_size, self.hidden, n_actions, vb)?.into(),
        };
        Ok(net)
    }
}
