#![allow(dead_code)]

use anyhow::Result;
use candle_core::Device;
use polgrad_agents::hooks::{BatchStats, HookResult, LearningHooks};
use polgrad_candle_lm::{
    learning_module::{CandleLearningModule, LearningModuleBuilder},
    networks::{NetBuilder, NetType},
    optimizer::OptimizerConfig,
};
use polgrad_core::env::Env;
use polgrad_gym::linear_reward::LinearReward;
use std::{cell::RefCell, rc::Rc};

pub fn linear_reward() -> Result<LinearReward> {
    Ok(LinearReward::new(10, 2))
}

pub fn learning_module(net_type: NetType) -> Result<CandleLearningModule> {
    let builder = LearningModuleBuilder {
        net: NetBuilder {
            net_type,
            hidden: 32,
        },
        optimizer: OptimizerConfig {
            lr: 5e-3,
            max_grad_norm: Some(1.),
            ..Default::default()
        },
    };
    builder.build(&linear_reward()?.env_description(), &Device::Cpu)
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub batches: Vec<BatchStats>,
    pub iterations: Vec<usize>,
}

/// Records every hook call and breaks once `break_after` optimizer steps have been seen.
pub struct RecordingHooks {
    pub recorded: Rc<RefCell<Recorded>>,
    pub break_after: Option<usize>,
}

impl RecordingHooks {
    pub fn new(break_after: Option<usize>) -> (Self, Rc<RefCell<Recorded>>) {
        let recorded = Rc::new(RefCell::new(Recorded::default()));
        let hooks = Self {
            recorded: recorded.clone(),
            break_after,
        };
        (hooks, recorded)
    }
}

impl LearningHooks for RecordingHooks {
    fn batch_hook(&mut self, stats: &BatchStats) -> Result<HookResult> {
        let mut recorded = self.recorded.borrow_mut();
        recorded.batches.push(stats.clone());
        match self.break_after {
            Some(limit) if recorded.batches.len() >= limit => Ok(HookResult::Break),
            _ => Ok(HookResult::Continue),
        }
    }

    fn iteration_hook(&mut self, iteration: usize) -> Result<HookResult> {
        self.recorded.borrow_mut().iterations.push(iteration);
        Ok(HookResult::Continue)
    }
}
