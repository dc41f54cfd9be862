use anyhow::{Result, ensure};
use polgrad_core::{
    env::{Env, EnvironmentDescription, SnapShot, Space},
    tensors::Buffer,
};

pub const DEFAULT_HORIZON: usize = 20;
pub const DEFAULT_ACTIONS: usize = 2;

/// Deterministic toy task: the reward of a step is the index of the chosen action, every episode
/// lasts exactly `horizon` steps. The optimal return is `(num_actions - 1) * horizon`.
#[derive(Debug, Clone)]
pub struct LinearReward {
    t: usize,
    horizon: usize,
    num_actions: usize,
}

impl Default for LinearReward {
    fn default() -> Self {
        Self::new(DEFAULT_HORIZON, DEFAULT_ACTIONS)
    }
}

impl LinearReward {
    pub fn new(horizon: usize, num_actions: usize) -> Self {
        Self {
            t: 0,
            horizon,
            num_actions,
        }
    }

    fn observation(&self) -> Buffer {
        Buffer::from_vec(vec![self.t as f32 / self.horizon as f32, 1.])
    }
}

impl Env for LinearReward {
    fn reset(&mut self, _seed: u64) -> Result<Buffer> {
        self.t = 0;
        Ok(self.observation())
    }

    fn step(&mut self, action: usize) -> Result<SnapShot> {
        ensure!(
            action < self.num_actions,
            "action {action} out of range for {} actions",
            self.num_actions
        );
        ensure!(self.t < self.horizon, "episode is over, call reset first");
        self.t += 1;
        Ok(SnapShot {
            state: self.observation(),
            reward: action as f32,
            terminated: self.t == self.horizon,
            truncated: false,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(
            Space::continuous_from_dims(vec![2]),
            Space::Discrete(self.num_actions),
        )
    }

    fn render(&mut self) -> Result<()> {
        println!("step {:>3}/{}", self.t, self.horizon);
        Ok(())
    }
}
