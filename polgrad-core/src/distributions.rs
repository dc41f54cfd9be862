use crate::rng::RNG;
use anyhow::{Result, anyhow};
use candle_core::{D, Tensor};
use candle_nn::ops::log_softmax;
use rand::{Rng, distr::Distribution, distr::weighted::WeightedIndex};

/// Categorical distribution over discrete actions, parametrized by unnormalized logits of shape
/// `(batch, num_actions)`.
#[derive(Debug, Clone)]
pub struct CategoricalDistribution {
    log_probs: Tensor,
}

impl CategoricalDistribution {
    pub fn new(logits: &Tensor) -> Result<Self> {
        let log_probs = log_softmax(logits, D::Minus1)?;
        Ok(Self { log_probs })
    }

    pub fn num_actions(&self) -> Result<usize> {
        Ok(self.log_probs.dim(D::Minus1)?)
    }

    pub fn probs(&self) -> Result<Tensor> {
        Ok(self.log_probs.exp()?)
    }

    /// Samples one action per row using the thread local generator.
    pub fn sample(&self) -> Result<Vec<usize>> {
        RNG.with_borrow_mut(|rng| self.sample_with(rng))
    }

    pub fn sample_with<R: Rng>(&self, rng: &mut R) -> Result<Vec<usize>> {
        let probs: Vec<Vec<f32>> = self.probs()?.detach().to_vec2()?;
        probs
            .iter()
            .map(|row| {
                let dist = WeightedIndex::new(row)
                    .map_err(|err| anyhow!("invalid action probabilities {row:?}: {err}"))?;
                Ok(dist.sample(rng))
            })
            .collect()
    }

    /// Most likely action per row.
    pub fn greedy(&self) -> Result<Vec<usize>> {
        let actions: Vec<u32> = self.log_probs.argmax(D::Minus1)?.to_vec1()?;
        Ok(actions.into_iter().map(|a| a as usize).collect())
    }

    /// Log probabilities of the given actions, one per row. Differentiable.
    pub fn log_probs(&self, actions: &[usize]) -> Result<Tensor> {
        let (rows, num_actions) = self.log_probs.dims2()?;
        if actions.len() != rows {
            return Err(anyhow!(
                "expected {rows} actions, got {}",
                actions.len()
            ));
        }
        let mut mask = vec![0f32; rows * num_actions];
        for (row, &action) in actions.iter().enumerate() {
            if action >= num_actions {
                return Err(anyhow!("action {action} out of range for {num_actions} actions"));
            }
            mask[row * num_actions + action] = 1.;
        }
        let mask = Tensor::from_vec(mask, (rows, num_actions), self.log_probs.device())?;
        Ok(self.log_probs.mul(&mask)?.sum(1)?)
    }

    /// Per row entropy `-sum(p log p)`. Differentiable.
    pub fn entropy(&self) -> Result<Tensor> {
        let probs = self.probs()?;
        Ok(probs.mul(&self.log_probs)?.sum(1)?.neg()?)
    }
}
