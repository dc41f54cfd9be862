use anyhow::{Context, Result, ensure};
use candle_core::{Tensor, Var, backprop::GradStore};
use candle_nn::{Optimizer, SGD, VarMap};
use polgrad_core::error::ConfigError;
use std::{collections::HashMap, fmt::Debug, str::FromStr};

pub const OPTIMIZER_PREFIX: &str = "optimizer";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamsAdam {
    pub lr: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

impl Default for ParamsAdam {
    fn default() -> Self {
        Self {
            lr: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

#[derive(Debug)]
struct AdamVar {
    name: String,
    var: Var,
    first_moment: Var,
    second_moment: Var,
}

/// Adam whose moment estimates can be exported and restored, so a checkpoint resumes the exact
/// update trajectory.
#[derive(Debug)]
pub struct Adam {
    vars: Vec<AdamVar>,
    step_t: usize,
    params: ParamsAdam,
}

impl Adam {
    pub fn new(named_vars: Vec<(String, Var)>, params: ParamsAdam) -> Result<Self> {
        let vars = named_vars
            .into_iter()
            .map(|(name, var)| {
                let first_moment = Var::zeros(var.shape(), var.dtype(), var.device())?;
                let second_moment = Var::zeros(var.shape(), var.dtype(), var.device())?;
                Ok(AdamVar {
                    name,
                    var,
                    first_moment,
                    second_moment,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            vars,
            step_t: 0,
            params,
        })
    }

    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step_t += 1;
        let ParamsAdam {
            lr,
            beta1,
            beta2,
            eps,
        } = self.params;
        let scale_m = 1. / (1. - beta1.powi(self.step_t as i32));
        let scale_v = 1. / (1. - beta2.powi(self.step_t as i32));
        for var in self.vars.iter() {
            let theta = &var.var;
            let Some(g) = grads.get(theta) else {
                continue;
            };
            let m = var
                .first_moment
                .affine(beta1, 0.)?
                .add(&g.affine(1. - beta1, 0.)?)?;
            let v = var
                .second_moment
                .affine(beta2, 0.)?
                .add(&g.sqr()?.affine(1. - beta2, 0.)?)?;
            let m_hat = m.affine(scale_m, 0.)?;
            let v_hat = v.affine(scale_v, 0.)?;
            let update = m_hat.div(&v_hat.sqrt()?.affine(1., eps)?)?;
            let next_theta = theta.sub(&update.affine(lr, 0.)?)?;
            var.first_moment.set(&m)?;
            var.second_moment.set(&v)?;
            theta.set(&next_theta)?;
        }
        Ok(())
    }

    pub fn learning_rate(&self) -> f64 {
        self.params.lr
    }

    pub fn step_count(&self) -> usize {
        self.step_t
    }

    fn step_name() -> String {
        format!("{OPTIMIZER_PREFIX}.adam.step")
    }

    fn moment_names(name: &str) -> (String, String) {
        (
            format!("{OPTIMIZER_PREFIX}.adam.m.{name}"),
            format!("{OPTIMIZER_PREFIX}.adam.v.{name}"),
        )
    }

    pub fn state_tensors(&self) -> Result<Vec<(String, Tensor)>> {
        let device = self
            .vars
            .first()
            .map(|v| v.var.device().clone())
            .unwrap_or(candle_core::Device::Cpu);
        let mut tensors = vec![(
            Self::step_name(),
            Tensor::new(&[self.step_t as u32], &device)?,
        )];
        for var in self.vars.iter() {
            let (m_name, v_name) = Self::moment_names(&var.name);
            tensors.push((m_name, var.first_moment.as_tensor().clone()));
            tensors.push((v_name, var.second_moment.as_tensor().clone()));
        }
        Ok(tensors)
    }

    /// Restores moments and step count. Names and shapes are expected to be validated already.
    pub fn load_state(&mut self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        let step_name = Self::step_name();
        let step = tensors
            .get(&step_name)
            .with_context(|| format!("missing `{step_name}`"))?
            .to_vec1::<u32>()?;
        ensure!(step.len() == 1, "`{step_name}` must hold a single value");
        for var in self.vars.iter() {
            let (m_name, v_name) = Self::moment_names(&var.name);
            let m = tensors.get(&m_name).with_context(|| format!("missing `{m_name}`"))?;
            let v = tensors.get(&v_name).with_context(|| format!("missing `{v_name}`"))?;
            var.first_moment.set(m)?;
            var.second_moment.set(v)?;
        }
        self.step_t = step[0] as usize;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizerType {
    #[default]
    Adam,
    Sgd,
}

impl FromStr for OptimizerType {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Adam" => Ok(Self::Adam),
            "SGD" => Ok(Self::Sgd),
            other => Err(ConfigError::UnknownOptimizer(other.to_owned())),
        }
    }
}

pub enum OptimizerKind {
    Adam(Adam),
    Sgd(SGD),
}

impl Debug for OptimizerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Adam(adam) => f.debug_tuple("Adam").field(adam).finish(),
            Self::Sgd(sgd) => f
                .debug_struct("Sgd")
                .field("lr", &sgd.learning_rate())
                .finish(),
        }
    }
}

impl OptimizerKind {
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match self {
            Self::Adam(adam) => adam.step(grads),
            Self::Sgd(sgd) => Ok(sgd.step(grads)?),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Adam(adam) => adam.learning_rate(),
            Self::Sgd(sgd) => sgd.learning_rate(),
        }
    }

    /// Optimizer state worth checkpointing. Plain SGD has none.
    pub fn state_tensors(&self) -> Result<Vec<(String, Tensor)>> {
        match self {
            Self::Adam(adam) => adam.state_tensors(),
            Self::Sgd(_) => Ok(vec![]),
        }
    }

    pub fn load_state(&mut self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        match self {
            Self::Adam(adam) => adam.load_state(tensors),
            Self::Sgd(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub optimizer_type: OptimizerType,
    pub lr: f64,
    pub max_grad_norm: Option<f32>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            optimizer_type: OptimizerType::Adam,
            lr: 1e-3,
            max_grad_norm: None,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.lr.is_finite() && self.lr > 0.) {
            return Err(ConfigError::InvalidLearningRate(self.lr));
        }
        if let Some(max_grad_norm) = self.max_grad_norm {
            if max_grad_norm.is_nan() || max_grad_norm <= 0. {
                return Err(ConfigError::InvalidMaxGradNorm(max_grad_norm));
            }
        }
        Ok(())
    }

    pub fn build(&self, varmap: &VarMap) -> Result<OptimizerWithMaxGrad> {
        self.validate()?;
        let optimizer = match self.optimizer_type {
            OptimizerType::Adam => {
                let params = ParamsAdam {
                    lr: self.lr,
                    ..Default::default()
                };
                OptimizerKind::Adam(Adam::new(named_vars(varmap)?, params)?)
            }
            OptimizerType::Sgd => OptimizerKind::Sgd(SGD::new(varmap.all_vars(), self.lr)?),
        };
        Ok(OptimizerWithMaxGrad::new(
            optimizer,
            self.max_grad_norm,
            varmap.clone(),
        ))
    }
}

/// Variables of `varmap` sorted by name.
pub fn named_vars(varmap: &VarMap) -> Result<Vec<(String, Var)>> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow::anyhow!("variable map lock poisoned"))?;
    let mut vars: Vec<(String, Var)> = data
        .iter()
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect();
    vars.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(vars)
}

/// Backpropagates `loss` and rescales the gradients so that their global norm is at most
/// `max_norm`.
pub fn clip_grad(loss: &Tensor, varmap: &VarMap, max_norm: f32) -> Result<GradStore> {
    let mut total_norm_squared = 0.0f32;
    let mut grad_store = loss.backward()?;
    let all_vars = varmap.all_vars();
    for var in all_vars.iter() {
        if let Some(grad) = grad_store.get(var.as_tensor()) {
            total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = (max_norm / (total_norm + 1e-6)) as f64;
        for var in all_vars.iter() {
            let new_grad = match grad_store.get(var.as_tensor()) {
                Some(grad) => grad.affine(clip_coef, 0.)?,
                None => continue,
            };
            grad_store.insert(var.as_tensor(), new_grad);
        }
    }
    Ok(grad_store)
}

pub struct OptimizerWithMaxGrad {
    pub optimizer: OptimizerKind,
    pub max_grad_norm: Option<f32>,
    pub varmap: VarMap,
}

impl Debug for OptimizerWithMaxGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerWithMaxGrad")
            .field("optimizer", &self.optimizer)
            .field("max_grad_norm", &self.max_grad_norm)
            .finish()
    }
}

impl OptimizerWithMaxGrad {
    pub fn new(optimizer: OptimizerKind, max_grad_norm: Option<f32>, varmap: VarMap) -> Self {
        Self {
            optimizer,
            max_grad_norm,
            varmap,
        }
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = if let Some(max_norm) = self.max_grad_norm {
            clip_grad(loss, &self.varmap, max_norm)?
        } else {
            loss.backward()?
        };
        self.optimizer.step(&grads)?;
        Ok(())
    }
}
