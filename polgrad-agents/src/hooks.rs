use anyhow::Result;
use polgrad_core::logger::Logger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookResult {
    Continue,
    Break,
}

/// Losses of a single optimizer step.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    /// Training iteration the step belongs to, counted from 0 within one `train` call.
    pub iteration: usize,
    /// Total optimizer steps taken by the agent, including this one.
    pub update: usize,
    pub policy_loss: f32,
    pub value_loss: Option<f32>,
    pub entropy: f32,
    pub loss: f32,
}

impl BatchStats {
    pub fn log(&self, logger: &dyn Logger) {
        logger.log_scalar("policy_loss", self.policy_loss, self.update);
        if let Some(value_loss) = self.value_loss {
            logger.log_scalar("value_loss", value_loss, self.update);
        }
        logger.log_scalar("entropy", self.entropy, self.update);
        logger.log_scalar("loss", self.loss, self.update);
    }
}

/// Callbacks into the training loop. Returning [`HookResult::Break`] stops training.
pub trait LearningHooks {
    /// Called after every optimizer step.
    fn batch_hook(&mut self, _stats: &BatchStats) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }

    /// Called after every training iteration.
    fn iteration_hook(&mut self, _iteration: usize) -> Result<HookResult> {
        Ok(HookResult::Continue)
    }
}

pub struct EmptyHooks;

impl LearningHooks for EmptyHooks {}

macro_rules! process_hook_result {
    ($hook_res:expr) => {
        match $hook_res? {
            $crate::hooks::HookResult::Continue => {}
            $crate::hooks::HookResult::Break => return Ok(()),
        }
    };
    ($hook_res:expr, $on_break:expr) => {
        match $hook_res? {
            $crate::hooks::HookResult::Continue => {}
            $crate::hooks::HookResult::Break => return Ok($on_break),
        }
    };
}

pub(crate) use process_hook_result;
