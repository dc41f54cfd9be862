use polgrad_core::logger::Logger;
use std::{cell::RefCell, path::Path};
use tensorboard_rs::summary_writer::SummaryWriter;

/// Writes scalars as TFRecord event files under `logdir`.
pub struct TensorboardLogger {
    writer: RefCell<SummaryWriter>,
}

impl TensorboardLogger {
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: RefCell::new(SummaryWriter::new(logdir)),
        }
    }
}

impl Logger for TensorboardLogger {
    fn log_scalar(&self, name: &str, value: f32, step: usize) {
        self.writer.borrow_mut().add_scalar(name, value, step);
    }

    fn flush(&self) {
        self.writer.borrow_mut().flush();
    }
}
