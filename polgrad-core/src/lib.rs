pub mod agents;
pub mod checkpoint;
pub mod distributions;
pub mod env;
pub mod env_pool;
pub mod episode;
pub mod error;
pub mod logger;
pub mod policies;
pub mod rng;
pub mod tensors;
pub mod utils;
