use log::debug;
use std::{cell::RefCell, rc::Rc};

/// Sink for training metrics. Implementations use interior mutability so one handle can be
/// shared between an agent and its environment pool.
pub trait Logger {
    fn log_scalar(&self, name: &str, value: f32, step: usize);

    fn flush(&self) {}
}

pub type LoggerHandle = Rc<dyn Logger>;

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log_scalar(&self, _name: &str, _value: f32, _step: usize) {}
}

/// Forwards metrics to the `log` facade at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn log_scalar(&self, name: &str, value: f32, step: usize) {
        debug!("{name:<16} step {step:<8} {value:.5}");
    }
}

#[derive(Debug)]
struct ScalarRecord {
    name: String,
    value: f32,
    step: usize,
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    records: RefCell<Vec<ScalarRecord>>,
    flushes: RefCell<usize>,
}

impl MemoryLogger {
    /// `(step, value)` pairs logged under `name`, in logging order.
    pub fn scalars(&self, name: &str) -> Vec<(usize, f32)> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.name == name)
            .map(|r| (r.step, r.value))
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.borrow()
    }
}

impl Logger for MemoryLogger {
    fn log_scalar(&self, name: &str, value: f32, step: usize) {
        self.records.borrow_mut().push(ScalarRecord {
            name: name.to_owned(),
            value,
            step,
        });
    }

    fn flush(&self) {
        *self.flushes.borrow_mut() += 1;
    }
}

/// Sends every record to each of its loggers.
#[derive(Default, Clone)]
pub struct FanoutLogger {
    loggers: Vec<LoggerHandle>,
}

impl FanoutLogger {
    pub fn new(loggers: Vec<LoggerHandle>) -> Self {
        Self { loggers }
    }
}

impl Logger for FanoutLogger {
    fn log_scalar(&self, name: &str, value: f32, step: usize) {
        for logger in &self.loggers {
            logger.log_scalar(name, value, step);
        }
    }

    fn flush(&self) {
        for logger in &self.loggers {
            logger.flush();
        }
    }
}
