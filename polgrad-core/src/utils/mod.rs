pub mod advantages;
pub mod rollout_buffer;
