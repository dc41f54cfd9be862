use crate::policies::LearningModule;
use anyhow::Result;

pub trait Agent {
    type Module: LearningModule;

    /// Retrieves the underlying learning module
    fn module(&self) -> &Self::Module;

    fn module_mut(&mut self) -> &mut Self::Module;

    /// Runs `train_steps` training iterations. What one iteration is depends on the algorithm.
    fn train(&mut self, train_steps: usize) -> Result<()>;
}
