use anyhow::{Result, bail, ensure};
use candle_core::{Device, Tensor};
use derive_more::{Deref, DerefMut, Display};

/// A single observation: flat data plus its logical shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl Buffer {
    pub fn from_vec(data: Vec<f32>) -> Self {
        let len = data.len();
        Self {
            data,
            shape: vec![len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Stacks observations into a `(batch, obs_size)` tensor.
pub fn stack_observations<'a>(
    observations: impl IntoIterator<Item = &'a Buffer>,
    device: &Device,
) -> Result<Tensor> {
    let mut data = vec![];
    let mut rows = 0;
    let mut obs_size = None;
    for observation in observations {
        match obs_size {
            None => obs_size = Some(observation.len()),
            Some(size) => ensure!(
                size == observation.len(),
                "observation size mismatch: {size} vs {}",
                observation.len()
            ),
        }
        data.extend_from_slice(&observation.data);
        rows += 1;
    }
    let Some(obs_size) = obs_size else {
        bail!("cannot stack an empty set of observations")
    };
    Ok(Tensor::from_vec(data, (rows, obs_size), device)?)
}

#[derive(Deref, DerefMut, Debug, Display)]
pub struct PolicyLoss(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display)]
pub struct ValueLoss(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display)]
pub struct Entropy(pub Tensor);
