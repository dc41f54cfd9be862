//! Classic cart-pole balancing task with the dynamics and limits of gymnasium's `CartPole-v1`.

use anyhow::{Result, ensure};
use polgrad_core::{
    env::{Env, EnvironmentDescription, SnapShot, Space},
    tensors::Buffer,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const GRAVITY: f32 = 9.8;
const CART_MASS: f32 = 1.0;
const POLE_MASS: f32 = 0.1;
const TOTAL_MASS: f32 = CART_MASS + POLE_MASS;
/// Half the pole length.
const POLE_LENGTH: f32 = 0.5;
const POLE_MASS_LENGTH: f32 = POLE_MASS * POLE_LENGTH;
const FORCE_MAG: f32 = 10.0;
const DT: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * std::f32::consts::PI / 180.0;
pub const MAX_STEPS: usize = 500;
const INIT_RANGE: f32 = 0.05;

#[derive(Debug, Clone)]
pub struct CartPole {
    x: f32,
    x_dot: f32,
    theta: f32,
    theta_dot: f32,
    steps: usize,
    max_steps: usize,
    done: bool,
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new(MAX_STEPS)
    }
}

impl CartPole {
    pub fn new(max_steps: usize) -> Self {
        Self {
            x: 0.,
            x_dot: 0.,
            theta: 0.,
            theta_dot: 0.,
            steps: 0,
            max_steps,
            done: true,
        }
    }

    fn observation(&self) -> Buffer {
        Buffer::from_vec(vec![self.x, self.x_dot, self.theta, self.theta_dot])
    }
}

impl Env for CartPole {
    fn reset(&mut self, seed: u64) -> Result<Buffer> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.x = rng.random_range(-INIT_RANGE..INIT_RANGE);
        self.x_dot = rng.random_range(-INIT_RANGE..INIT_RANGE);
        self.theta = rng.random_range(-INIT_RANGE..INIT_RANGE);
        self.theta_dot = rng.random_range(-INIT_RANGE..INIT_RANGE);
        self.steps = 0;
        self.done = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: usize) -> Result<SnapShot> {
        ensure!(!self.done, "CartPole stepped after the episode ended, call reset first");
        ensure!(action < 2, "CartPole action must be 0 or 1, got {action}");
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let cos_theta = self.theta.cos();
        let sin_theta = self.theta.sin();

        let temp =
            (force + POLE_MASS_LENGTH * self.theta_dot * self.theta_dot * sin_theta) / TOTAL_MASS;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (POLE_LENGTH * (4.0 / 3.0 - POLE_MASS * cos_theta * cos_theta / TOTAL_MASS));
        let x_acc = temp - POLE_MASS_LENGTH * theta_acc * cos_theta / TOTAL_MASS;

        self.x += DT * self.x_dot;
        self.x_dot += DT * x_acc;
        self.theta += DT * self.theta_dot;
        self.theta_dot += DT * theta_acc;
        self.steps += 1;

        let terminated = self.x.abs() > X_THRESHOLD || self.theta.abs() > THETA_THRESHOLD;
        let truncated = !terminated && self.steps >= self.max_steps;
        self.done = terminated || truncated;
        Ok(SnapShot {
            state: self.observation(),
            reward: 1.0,
            terminated,
            truncated,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(Space::continuous_from_dims(vec![4]), Space::Discrete(2))
    }

    fn render(&mut self) -> Result<()> {
        const WIDTH: usize = 49;
        let position = ((self.x + X_THRESHOLD) / (2. * X_THRESHOLD) * (WIDTH - 1) as f32)
            .round()
            .clamp(0., (WIDTH - 1) as f32) as usize;
        let mut track = vec!['-'; WIDTH];
        track[position] = if self.theta > 0.05 {
            '/'
        } else if self.theta < -0.05 {
            '\\'
        } else {
            '|'
        };
        println!(
            "{} step {:>3} theta {:+.3}",
            track.into_iter().collect::<String>(),
            self.steps,
            self.theta
        );
        Ok(())
    }
}
