use crate::{
    networks::{NetBuilder, NetKind, Network},
    optimizer::{OptimizerConfig, OptimizerWithMaxGrad, named_vars},
};
use anyhow::{Result, bail, ensure};
use candle_core::{DType, Device, Tensor, safetensors};
use candle_nn::{VarBuilder, VarMap};
use log::debug;
use polgrad_core::{
    env::EnvironmentDescription,
    policies::{Checkpoint, LearningModule, PolicyOutput, PolicyValue},
};
use std::{collections::HashMap, path::Path};

/// A network together with the optimizer that trains it.
#[derive(Debug)]
pub struct CandleLearningModule {
    pub net: NetKind,
    pub optimizer: OptimizerWithMaxGrad,
    device: Device,
}

impl CandleLearningModule {
    pub fn learning_rate(&self) -> f64 {
        self.optimizer.optimizer.learning_rate()
    }

    fn varmap(&self) -> &VarMap {
        &self.optimizer.varmap
    }

    /// Everything a checkpoint holds, sorted by name.
    pub fn state_tensors(&self) -> Result<Vec<(String, Tensor)>> {
        let mut tensors: Vec<(String, Tensor)> = named_vars(self.varmap())?
            .into_iter()
            .map(|(name, var)| (name, var.as_tensor().clone()))
            .collect();
        tensors.extend(self.optimizer.optimizer.state_tensors()?);
        tensors.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(tensors)
    }
}

impl PolicyValue for CandleLearningModule {
    fn forward(&self, observations: &Tensor) -> Result<PolicyOutput> {
        let (logits, values) = self.net.forward_heads(observations)?;
        Ok(PolicyOutput { logits, values })
    }

    fn has_critic(&self) -> bool {
        self.net.has_critic()
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl LearningModule for CandleLearningModule {
    fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.optimizer.backward_step(loss)
    }
}

impl Checkpoint for CandleLearningModule {
    fn save(&self, path: &Path) -> Result<()> {
        let tensors: HashMap<String, Tensor> = self.state_tensors()?.into_iter().collect();
        safetensors::save(&tensors, path)?;
        debug!("wrote {} tensors to {path:?}", tensors.len());
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        let stored = safetensors::load(path, &self.device)?;
        let expected = self.state_tensors()?;
        for (name, tensor) in expected.iter() {
            let Some(found) = stored.get(name) else {
                bail!("checkpoint has no tensor `{name}`, the architecture does not match");
            };
            ensure!(
                found.dims() == tensor.dims() && found.dtype() == tensor.dtype(),
                "tensor `{name}` is {:?} {:?} in the checkpoint, expected {:?} {:?}",
                found.dtype(),
                found.dims(),
                tensor.dtype(),
                tensor.dims()
            );
        }
        if stored.len() != expected.len() {
            let mut unexpected: Vec<&String> = stored
                .keys()
                .filter(|name| !expected.iter().any(|(expected, _)| expected == *name))
                .collect();
            unexpected.sort();
            bail!("checkpoint has unexpected tensors {unexpected:?}");
        }
        for (name, var) in named_vars(self.varmap())? {
            if let Some(tensor) = stored.get(&name) {
                var.set(tensor)?;
            }
        }
        self.optimizer.optimizer.load_state(&stored)?;
        debug!("restored {} tensors from {path:?}", stored.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LearningModuleBuilder {
    pub net: NetBuilder,
    pub optimizer: OptimizerConfig,
}

impl LearningModuleBuilder {
    pub fn validate(&self) -> std::result::Result<(), polgrad_core::error::ConfigError> {
        self.net.validate()?;
        self.optimizer.validate()
    }

    pub fn build(
        &self,
        env_description: &EnvironmentDescription,
        device: &Device,
    ) -> Result<CandleLearningModule> {
        self.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let net = self.net.build(env_description, &vb)?;
        let optimizer = self.optimizer.build(&varmap)?;
        Ok(CandleLearningModule {
            net,
            optimizer,
            device: device.clone(),
        })
    }
}
