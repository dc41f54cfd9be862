use super::rollout_buffer::RolloutBatch;
use anyhow::{Result, ensure};
use derive_more::{Deref, DerefMut};

/// Per trajectory advantages, in the same `(trajectory, step)` layout as a [`RolloutBatch`].
#[derive(Deref, DerefMut, Debug, Clone, PartialEq)]
pub struct Advantages(pub Vec<Vec<f32>>);

/// Per trajectory value targets.
#[derive(Deref, DerefMut, Debug, Clone, PartialEq)]
pub struct Returns(pub Vec<Vec<f32>>);

impl Advantages {
    /// Standardizes the advantages across all trajectories at once.
    pub fn normalize(&mut self) {
        let mut flat = self.flatten();
        normalize(&mut flat);
        for (x, normalized) in self.0.iter_mut().flatten().zip(flat) {
            *x = normalized;
        }
    }

    pub fn flatten(&self) -> Vec<f32> {
        self.0.iter().flatten().copied().collect()
    }
}

impl Returns {
    pub fn flatten(&self) -> Vec<f32> {
        self.0.iter().flatten().copied().collect()
    }
}

/// Standardizes `values` in place to zero mean and unit variance.
pub fn normalize(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    let len = values.len() as f32;
    let mean = values.iter().sum::<f32>() / len;
    let variance = values.iter().map(|x| (*x - mean).powi(2)).sum::<f32>() / len;
    let std = variance.sqrt() + 1e-8;
    for x in values.iter_mut() {
        *x = (*x - mean) / std;
    }
}

fn check_aligned(rewards: &[f32], dones: &[bool], values: Option<&[f32]>) -> Result<()> {
    ensure!(
        dones.len() == rewards.len(),
        "expected {} done flags, got {}",
        rewards.len(),
        dones.len()
    );
    if let Some(values) = values {
        ensure!(
            values.len() == rewards.len(),
            "expected {} values, got {}",
            rewards.len(),
            values.len()
        );
    }
    Ok(())
}

/// `R[t] = r[t] + gamma * R[t + 1] * (1 - done[t])`, where the value past the last step is
/// `bootstrap`.
pub fn discounted_returns(
    rewards: &[f32],
    dones: &[bool],
    bootstrap: f32,
    gamma: f32,
) -> Result<Vec<f32>> {
    check_aligned(rewards, dones, None)?;
    let mut returns = vec![0.; rewards.len()];
    let mut next_return = bootstrap;
    for t in (0..rewards.len()).rev() {
        let next_non_terminal = if dones[t] { 0. } else { 1. };
        next_return = rewards[t] + gamma * next_return * next_non_terminal;
        returns[t] = next_return;
    }
    Ok(returns)
}

/// One step temporal difference residuals `r[t] + gamma * V[t + 1] * (1 - done[t]) - V[t]`.
pub fn td_residuals(
    rewards: &[f32],
    dones: &[bool],
    values: &[f32],
    next_value: f32,
    gamma: f32,
) -> Result<Vec<f32>> {
    check_aligned(rewards, dones, Some(values))?;
    Ok((0..rewards.len())
        .map(|t| {
            let next_non_terminal = if dones[t] { 0. } else { 1. };
            let next_value = values.get(t + 1).copied().unwrap_or(next_value);
            rewards[t] + gamma * next_value * next_non_terminal - values[t]
        })
        .collect())
}

/// Generalized advantage estimation.
pub fn gae(
    rewards: &[f32],
    dones: &[bool],
    values: &[f32],
    next_value: f32,
    gamma: f32,
    lambda: f32,
) -> Result<Vec<f32>> {
    let deltas = td_residuals(rewards, dones, values, next_value, gamma)?;
    let mut advantages = vec![0.; rewards.len()];
    let mut last_gae_lam = 0.;
    for t in (0..rewards.len()).rev() {
        let next_non_terminal = if dones[t] { 0. } else { 1. };
        last_gae_lam = deltas[t] + gamma * lambda * next_non_terminal * last_gae_lam;
        advantages[t] = last_gae_lam;
    }
    Ok(advantages)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvantageEstimator {
    /// `A = R - V` with Monte-Carlo returns
    MonteCarlo,
    Gae { lambda: f32 },
}

impl AdvantageEstimator {
    pub fn from_lambda(lambda: Option<f32>) -> Self {
        match lambda {
            Some(lambda) => Self::Gae { lambda },
            None => Self::MonteCarlo,
        }
    }

    /// Advantages and value targets for one trajectory.
    pub fn estimate(
        &self,
        rewards: &[f32],
        dones: &[bool],
        values: &[f32],
        next_value: f32,
        gamma: f32,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        match self {
            Self::MonteCarlo => {
                check_aligned(rewards, dones, Some(values))?;
                let returns = discounted_returns(rewards, dones, next_value, gamma)?;
                let advantages = returns.iter().zip(values).map(|(r, v)| r - v).collect();
                Ok((advantages, returns))
            }
            Self::Gae { lambda } => {
                let advantages = gae(rewards, dones, values, next_value, gamma, *lambda)?;
                let returns = advantages.iter().zip(values).map(|(a, v)| a + v).collect();
                Ok((advantages, returns))
            }
        }
    }
}

/// Runs `estimator` over every trajectory of `batch`. `values` holds the value estimate of each
/// recorded step, `bootstrap` the value of each trajectory's last state.
pub fn calculate_advantages_and_returns(
    batch: &RolloutBatch,
    values: &[Vec<f32>],
    bootstrap: &[f32],
    gamma: f32,
    estimator: AdvantageEstimator,
) -> Result<(Advantages, Returns)> {
    ensure!(
        values.len() == batch.len() && bootstrap.len() == batch.len(),
        "expected values for {} trajectories",
        batch.len()
    );
    let mut advantages = Vec::with_capacity(batch.len());
    let mut returns = Vec::with_capacity(batch.len());
    for ((trajectory, values), next_value) in batch.iter().zip(values).zip(bootstrap) {
        ensure!(
            values.len() == trajectory.len(),
            "expected {} values, got {}",
            trajectory.len(),
            values.len()
        );
        let (adv, ret) = estimator.estimate(
            &trajectory.rewards,
            &trajectory.dones,
            values,
            *next_value,
            gamma,
        )?;
        advantages.push(adv);
        returns.push(ret);
    }
    Ok((Advantages(advantages), Returns(returns)))
}
