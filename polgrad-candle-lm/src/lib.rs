pub mod learning_module;
pub mod networks;
pub mod optimizer;
pub mod sequential;
