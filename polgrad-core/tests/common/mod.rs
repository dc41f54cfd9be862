#![allow(dead_code)]

use anyhow::Result;
use candle_core::{Device, Tensor};
use polgrad_core::{
    env::{Env, EnvironmentDescription, SnapShot, Space},
    policies::{PolicyOutput, PolicyValue},
    tensors::Buffer,
};
use std::{cell::Cell, rc::Rc};

/// Observation is the step counter, reward is `1 + action`, episodes end after `horizon` steps.
pub struct CountingEnv {
    pub t: usize,
    pub horizon: usize,
    pub closed: Rc<Cell<usize>>,
}

impl CountingEnv {
    pub fn new(horizon: usize) -> Self {
        Self {
            t: 0,
            horizon,
            closed: Rc::new(Cell::new(0)),
        }
    }
}

impl Env for CountingEnv {
    fn reset(&mut self, _seed: u64) -> Result<Buffer> {
        self.t = 0;
        Ok(Buffer::from_vec(vec![0.]))
    }

    fn step(&mut self, action: usize) -> Result<SnapShot> {
        self.t += 1;
        Ok(SnapShot {
            state: Buffer::from_vec(vec![self.t as f32]),
            reward: 1. + action as f32,
            terminated: self.t == self.horizon,
            truncated: false,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continuous_from_dims(vec![1]), Space::Discrete(2))
    }

    fn close(&mut self) -> Result<()> {
        self.closed.set(self.closed.get() + 1);
        Ok(())
    }
}

/// Two action policy with fixed logits and a constant value estimate.
pub struct FixedPolicy {
    pub logits: [f32; 2],
    pub value: Option<f32>,
    pub device: Device,
}

impl FixedPolicy {
    pub fn prefers_second_action() -> Self {
        Self {
            logits: [-20., 20.],
            value: Some(0.5),
            device: Device::Cpu,
        }
    }

    pub fn uniform_without_critic() -> Self {
        Self {
            logits: [0., 0.],
            value: None,
            device: Device::Cpu,
        }
    }
}

impl PolicyValue for FixedPolicy {
    fn forward(&self, observations: &Tensor) -> Result<PolicyOutput> {
        let batch = observations.dim(0)?;
        let logits: Vec<f32> = (0..batch).flat_map(|_| self.logits).collect();
        let logits = Tensor::from_vec(logits, (batch, 2), &self.device)?;
        let values = match self.value {
            Some(value) => Some(Tensor::from_vec(vec![value; batch], batch, &self.device)?),
            None => None,
        };
        Ok(PolicyOutput { logits, values })
    }

    fn has_critic(&self) -> bool {
        self.value.is_some()
    }

    fn device(&self) -> &Device {
        &self.device
    }
}
