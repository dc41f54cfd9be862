mod common;

use anyhow::Result;
use common::{CountingEnv, FixedPolicy};
use polgrad_core::{
    env_pool::EnvPool,
    error::ConfigError,
    logger::{LoggerHandle, MemoryLogger, NullLogger},
    policies::estimate_values,
    tensors::Buffer,
    utils::advantages::{AdvantageEstimator, calculate_advantages_and_returns},
};
use std::rc::Rc;

const NUM_ENVIRONMENTS: usize = 3;
const HORIZON: usize = 4;
const ROLLOUT_LEN: usize = 10;

fn pool(logger: LoggerHandle) -> Result<EnvPool<CountingEnv>> {
    EnvPool::from_builder(|| Ok(CountingEnv::new(HORIZON)), NUM_ENVIRONMENTS, logger)
}

#[test]
fn rollout_has_one_trajectory_per_env() -> Result<()> {
    let mut pool = pool(Rc::new(NullLogger))?;
    let policy = FixedPolicy::prefers_second_action();
    let batch = pool.collect_rollout(&policy, ROLLOUT_LEN)?;
    assert_eq!(batch.shape(), (NUM_ENVIRONMENTS, ROLLOUT_LEN));
    for trajectory in batch.iter() {
        assert_eq!(trajectory.actions, vec![1; ROLLOUT_LEN]);
        assert_eq!(trajectory.rewards, vec![2.; ROLLOUT_LEN]);
        assert_eq!(trajectory.recorded_values(), Some(vec![0.5; ROLLOUT_LEN]));
        assert!(trajectory.logps.iter().all(|logp| *logp > -1e-3));
    }
    Ok(())
}

#[test]
fn finished_episodes_are_reset_in_place() -> Result<()> {
    let mut pool = pool(Rc::new(NullLogger))?;
    let batch = pool.collect_rollout(&FixedPolicy::uniform_without_critic(), ROLLOUT_LEN)?;
    let trajectory = &batch[0];
    let expected_dones: Vec<bool> = (0..ROLLOUT_LEN).map(|t| (t + 1) % HORIZON == 0).collect();
    assert_eq!(trajectory.dones, expected_dones);
    // the step after a done acts on the first observation of the next episode
    let observed: Vec<f32> = trajectory.states.iter().map(|s| s.data[0]).collect();
    assert_eq!(observed, vec![0., 1., 2., 3., 0., 1., 2., 3., 0., 1.]);
    assert_eq!(trajectory.last_state, Some(Buffer::from_vec(vec![2.])));
    assert_eq!(trajectory.recorded_values(), None);
    Ok(())
}

#[test]
fn completed_episodes_are_logged() -> Result<()> {
    let logger = Rc::new(MemoryLogger::default());
    let mut pool = pool(logger.clone())?;
    pool.collect_rollout(&FixedPolicy::prefers_second_action(), ROLLOUT_LEN)?;
    let completed = NUM_ENVIRONMENTS * (ROLLOUT_LEN / HORIZON);
    assert_eq!(pool.completed_episodes(), completed);
    let rewards = logger.scalars("episode_reward");
    let steps: Vec<usize> = rewards.iter().map(|(step, _)| *step).collect();
    assert_eq!(steps, (1..=completed).collect::<Vec<_>>());
    assert!(rewards.iter().all(|(_, reward)| *reward == 2. * HORIZON as f32));
    let lengths = logger.scalars("episode_length");
    assert_eq!(lengths.len(), completed);
    assert!(lengths.iter().all(|(_, len)| *len == HORIZON as f32));
    Ok(())
}

#[test]
fn step_checks_its_input() -> Result<()> {
    let mut pool = pool(Rc::new(NullLogger))?;
    assert!(pool.step(&[0; NUM_ENVIRONMENTS]).is_err());
    pool.reset()?;
    assert!(pool.step(&[0; NUM_ENVIRONMENTS - 1]).is_err());
    let step = pool.step(&[0, 1, 0])?;
    assert_eq!(step.rewards, vec![1., 2., 1.]);
    assert_eq!(step.dones, vec![false; NUM_ENVIRONMENTS]);
    assert_eq!(step.observations[1], Buffer::from_vec(vec![1.]));
    Ok(())
}

#[test]
fn empty_pool_is_a_configuration_error() {
    let err = EnvPool::<CountingEnv>::new(vec![], Rc::new(NullLogger))
        .err()
        .expect("an empty pool must be rejected");
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::ZeroCount {
            name: "n_environments"
        })
    );
}

#[test]
fn dropping_the_pool_closes_every_env() -> Result<()> {
    let env = CountingEnv::new(HORIZON);
    let closed = env.closed.clone();
    let envs = (0..NUM_ENVIRONMENTS)
        .map(|_| CountingEnv {
            t: 0,
            horizon: HORIZON,
            closed: closed.clone(),
        })
        .collect();
    drop(env);
    let mut pool = EnvPool::new(envs, Rc::new(NullLogger))?;
    pool.close()?;
    drop(pool);
    assert_eq!(closed.get(), NUM_ENVIRONMENTS);
    Ok(())
}

#[test]
fn unfinished_episodes_bootstrap_from_the_last_state() -> Result<()> {
    let mut pool = EnvPool::from_builder(|| Ok(CountingEnv::new(HORIZON)), 1, Rc::new(NullLogger))?;
    let policy = FixedPolicy::prefers_second_action();
    let batch = pool.collect_rollout(&policy, 6)?;
    let values = batch
        .iter()
        .map(|trajectory| trajectory.recorded_values().unwrap())
        .collect::<Vec<_>>();
    let bootstrap = estimate_values(&policy, batch.last_states()?)?;
    assert_eq!(bootstrap, vec![0.5]);
    for estimator in [
        AdvantageEstimator::MonteCarlo,
        AdvantageEstimator::Gae { lambda: 1. },
    ] {
        let (advantages, returns) =
            calculate_advantages_and_returns(&batch, &values, &bootstrap, 1., estimator)?;
        // the first episode ends at step 3, the second is cut off and bootstrapped with V = 0.5
        assert_eq!(returns.flatten(), vec![8., 6., 4., 2., 4.5, 2.5]);
        assert_eq!(advantages.flatten(), vec![7.5, 5.5, 3.5, 1.5, 4., 2.]);
    }
    let wrong_bootstrap = [0.5, 0.5];
    assert!(
        calculate_advantages_and_returns(
            &batch,
            &values,
            &wrong_bootstrap,
            1.,
            AdvantageEstimator::MonteCarlo
        )
        .is_err()
    );
    Ok(())
}
