use crate::tensors::Buffer;
use anyhow::{Result, ensure};
use derive_more::{Deref, DerefMut};

/// One recorded environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Buffer,
    pub action: usize,
    pub reward: f32,
    pub done: bool,
    pub value: Option<f32>,
    pub logp: f32,
}

/// Trajectory of a single environment, stored field by field. A trajectory may span several
/// episodes, `dones` marks the boundaries.
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    pub states: Vec<Buffer>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    pub dones: Vec<bool>,
    pub values: Vec<Option<f32>>,
    pub logps: Vec<f32>,
    /// Observation following the last recorded step, used for bootstrapping.
    pub last_state: Option<Buffer>,
}

impl RolloutBuffer {
    pub fn push_step(&mut self, transition: Transition) {
        let Transition {
            observation,
            action,
            reward,
            done,
            value,
            logp,
        } = transition;
        self.states.push(observation);
        self.actions.push(action);
        self.rewards.push(reward);
        self.dones.push(done);
        self.values.push(value);
        self.logps.push(logp);
    }

    pub fn set_last_state(&mut self, state: Buffer) {
        self.last_state = Some(state);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Value estimates recorded at collection time, if every step has one.
    pub fn recorded_values(&self) -> Option<Vec<f32>> {
        self.values.iter().copied().collect()
    }

    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }

    pub fn transition(&self, idx: usize) -> Transition {
        Transition {
            observation: self.states[idx].clone(),
            action: self.actions[idx],
            reward: self.rewards[idx],
            done: self.dones[idx],
            value: self.values[idx],
            logp: self.logps[idx],
        }
    }
}

/// Trajectories of equal length, one per environment slot. Row major: `(trajectory, step)`.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct RolloutBatch(Vec<RolloutBuffer>);

impl RolloutBatch {
    pub fn new(trajectories: Vec<RolloutBuffer>) -> Result<Self> {
        ensure!(!trajectories.is_empty(), "a rollout batch needs at least one trajectory");
        let steps = trajectories[0].len();
        ensure!(steps > 0, "rollout trajectories must not be empty");
        ensure!(
            trajectories.iter().all(|t| t.len() == steps),
            "rollout trajectories must all have {steps} steps"
        );
        Ok(Self(trajectories))
    }

    /// Concatenates the trajectories of several batches collected with the same rollout length.
    pub fn concat(batches: Vec<RolloutBatch>) -> Result<Self> {
        Self::new(batches.into_iter().flat_map(|b| b.0).collect())
    }

    /// `(trajectories, steps per trajectory)`
    pub fn shape(&self) -> (usize, usize) {
        (self.0.len(), self.0[0].len())
    }

    pub fn num_steps(&self) -> usize {
        let (trajectories, steps) = self.shape();
        trajectories * steps
    }

    pub fn observations(&self) -> impl Iterator<Item = &Buffer> {
        self.0.iter().flat_map(|t| t.states.iter())
    }

    pub fn actions(&self) -> Vec<usize> {
        self.0.iter().flat_map(|t| t.actions.iter().copied()).collect()
    }

    pub fn last_states(&self) -> Result<Vec<&Buffer>> {
        self.0
            .iter()
            .map(|t| {
                t.last_state
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("trajectory has no last state"))
            })
            .collect()
    }
}
