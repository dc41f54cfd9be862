use crate::{
    distributions::CategoricalDistribution,
    tensors::{Buffer, stack_observations},
};
use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use std::path::Path;

/// Raw network output for a batch of observations.
#[derive(Debug, Clone)]
pub struct PolicyOutput {
    /// `(batch, num_actions)`
    pub logits: Tensor,
    /// `(batch,)`, absent for networks without a value head
    pub values: Option<Tensor>,
}

impl PolicyOutput {
    pub fn distribution(&self) -> Result<CategoricalDistribution> {
        CategoricalDistribution::new(&self.logits)
    }

    pub fn values(&self) -> Result<&Tensor> {
        self.values
            .as_ref()
            .context("the network does not estimate state values")
    }

    pub fn detach(&self) -> Self {
        Self {
            logits: self.logits.detach(),
            values: self.values.as_ref().map(Tensor::detach),
        }
    }
}

/// A network mapping observations to an action distribution and optionally a state value.
pub trait PolicyValue {
    fn forward(&self, observations: &Tensor) -> Result<PolicyOutput>;

    fn has_critic(&self) -> bool;

    fn device(&self) -> &Device;
}

/// A policy that can update its own parameters.
pub trait LearningModule: PolicyValue {
    /// Backpropagates `loss` and applies one optimizer step.
    fn backward_step(&mut self, loss: &Tensor) -> Result<()>;
}

pub trait Checkpoint {
    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Detached value estimates for a set of observations.
pub fn estimate_values<'a, P: PolicyValue + ?Sized>(
    policy: &P,
    observations: impl IntoIterator<Item = &'a Buffer>,
) -> Result<Vec<f32>> {
    let observations = stack_observations(observations, policy.device())?;
    let output = policy.forward(&observations)?;
    Ok(output.values()?.detach().to_vec1()?)
}
