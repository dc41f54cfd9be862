// Every random draw in the workspace (environment reset seeds, action sampling, minibatch
// shuffling) goes through this thread local generator, so seeding it once makes a training run
// reproducible.

use rand::{Rng, SeedableRng, rngs::StdRng};
use std::cell::RefCell;

thread_local! {
    pub static RNG: RefCell<StdRng> = RefCell::new(StdRng::seed_from_u64(0));
}

/// Reseeds the thread local generator.
pub fn seed(seed: u64) {
    RNG.with_borrow_mut(|rng| *rng = StdRng::seed_from_u64(seed));
}

/// Draws a fresh seed, used when resetting environments.
pub fn random_seed() -> u64 {
    RNG.with_borrow_mut(|rng| rng.random())
}
