mod common;

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use common::{RecordingHooks, learning_module, linear_reward};
use polgrad_agents::builders::PPOBuilder;
use polgrad_candle_lm::networks::NetType;
use polgrad_core::{
    agents::Agent,
    error::ConfigError,
    logger::{MemoryLogger, NullLogger},
    policies::{LearningModule, PolicyOutput, PolicyValue},
    rng,
};
use polgrad_gym::linear_reward::LinearReward;
use std::rc::Rc;

fn builder() -> PPOBuilder {
    PPOBuilder {
        n_environments: 4,
        rollout_len: 5,
        ppo_batch_size: 3,
        num_ppo_epochs: 2,
        ..Default::default()
    }
}

#[test]
fn ppo_runs_every_epoch_over_every_minibatch() -> Result<()> {
    rng::seed(2);
    let logger = Rc::new(MemoryLogger::default());
    let (hooks, recorded) = RecordingHooks::new(None);
    let mut agent = builder()
        .build(learning_module(NetType::Shared)?, linear_reward, logger.clone())?
        .with_hooks(Box::new(hooks));
    agent.train(3)?;

    // 4 trajectories in minibatches of 3 give 2 minibatches per epoch
    let recorded = recorded.borrow();
    assert_eq!(recorded.batches.len(), 3 * 2 * 2);
    assert_eq!(recorded.iterations, vec![0, 1, 2]);
    let per_iteration: Vec<usize> = (0..3)
        .map(|it| recorded.batches.iter().filter(|s| s.iteration == it).count())
        .collect();
    assert_eq!(per_iteration, vec![4, 4, 4]);

    let names = [
        "policy_loss",
        "value_loss",
        "entropy",
        "loss",
        "clip_fraction",
        "approx_kl",
    ];
    for name in names {
        let scalars = logger.scalars(name);
        assert_eq!(scalars.len(), 12, "{name}");
        assert!(scalars.iter().all(|(_, value)| value.is_finite()), "{name}");
    }
    // the first minibatch of an iteration sees the collection policy, so nothing is clipped
    assert_eq!(logger.scalars("clip_fraction")[0].1, 0.);
    Ok(())
}

#[test]
fn ppo_gathers_several_rollouts_per_iteration() -> Result<()> {
    let logger = Rc::new(MemoryLogger::default());
    let (hooks, recorded) = RecordingHooks::new(None);
    let builder = PPOBuilder {
        num_rollouts: 2,
        gae_lambda: None,
        ..builder()
    };
    let mut agent = builder
        .build(learning_module(NetType::Separate)?, linear_reward, logger)?
        .with_hooks(Box::new(hooks));
    agent.train(1)?;
    // 8 trajectories in minibatches of 3 give 3 minibatches per epoch
    assert_eq!(recorded.borrow().batches.len(), 2 * 3);
    Ok(())
}

#[test]
fn ppo_stops_when_a_hook_breaks() -> Result<()> {
    let (hooks, recorded) = RecordingHooks::new(Some(5));
    let mut agent = builder()
        .build(learning_module(NetType::Shared)?, linear_reward, Rc::new(NullLogger))?
        .with_hooks(Box::new(hooks));
    agent.train(10)?;
    assert_eq!(recorded.borrow().batches.len(), 5);
    assert_eq!(recorded.borrow().iterations, vec![0]);
    Ok(())
}

/// A policy without a value head.
struct ActorOnly {
    device: Device,
}

impl PolicyValue for ActorOnly {
    fn forward(&self, observations: &Tensor) -> Result<PolicyOutput> {
        let batch = observations.dim(0)?;
        let logits = Tensor::zeros((batch, 2), DType::F32, &self.device)?;
        Ok(PolicyOutput {
            logits,
            values: None,
        })
    }

    fn has_critic(&self) -> bool {
        false
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl LearningModule for ActorOnly {
    fn backward_step(&mut self, _loss: &Tensor) -> Result<()> {
        Ok(())
    }
}

#[test]
fn ppo_needs_a_critic() {
    let built = builder().build(
        ActorOnly {
            device: Device::Cpu,
        },
        || -> Result<LinearReward> {
            panic!("no environment may be built for an invalid configuration")
        },
        Rc::new(NullLogger),
    );
    let err = built.err().expect("building must fail");
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::MissingCritic { agent: "PPO" })
    );
}
