mod common;

use anyhow::Result;
use common::{RecordingHooks, learning_module, linear_reward};
use polgrad_agents::{AgentKind, builders::A2CBuilder};
use polgrad_candle_lm::networks::NetType;
use polgrad_core::{agents::Agent, logger::MemoryLogger, rng};
use std::rc::Rc;

const NUM_ENVIRONMENTS: usize = 4;
const ROLLOUT_LEN: usize = 5;

#[test]
fn a2c_linear_reward() -> Result<()> {
    rng::seed(1);
    let logger = Rc::new(MemoryLogger::default());
    let (hooks, recorded) = RecordingHooks::new(None);
    let builder = A2CBuilder {
        n_environments: NUM_ENVIRONMENTS,
        rollout_len: ROLLOUT_LEN,
        ..Default::default()
    };
    let a2c = builder
        .build(learning_module(NetType::Shared)?, linear_reward, logger.clone())?
        .with_hooks(Box::new(hooks));
    let mut agent = AgentKind::A2C(a2c);
    agent.train(30)?;

    let recorded = recorded.borrow();
    assert_eq!(recorded.batches.len(), 30);
    assert!(recorded.batches.iter().all(|s| s.value_loss.is_some()));
    for name in ["policy_loss", "value_loss", "entropy", "loss"] {
        let scalars = logger.scalars(name);
        assert_eq!(scalars.len(), 30, "{name}");
        assert!(scalars.iter().all(|(_, value)| value.is_finite()), "{name}");
    }
    // normalized advantages
    for (_, mean) in logger.scalars("advantage_mean") {
        assert!(mean.abs() < 1e-4);
    }
    // 30 * 4 * 5 steps with episodes of 10 steps
    assert_eq!(logger.scalars("episode_reward").len(), 60);
    Ok(())
}

#[test]
fn a2c_without_normalization_on_separate_nets() -> Result<()> {
    let logger = Rc::new(MemoryLogger::default());
    let builder = A2CBuilder {
        n_environments: 2,
        rollout_len: 3,
        normalize_advantage: false,
        ..Default::default()
    };
    let mut agent = builder.build(
        learning_module(NetType::Separate)?,
        linear_reward,
        logger.clone(),
    )?;
    agent.train(5)?;
    assert_eq!(logger.scalars("loss").len(), 5);
    let stds = logger.scalars("advantage_std");
    assert!(stds.iter().all(|(_, std)| std.is_finite()));
    Ok(())
}
