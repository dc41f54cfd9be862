mod config;
mod tensorboard;

use anyhow::Result;
use clap::Parser;
use config::{Args, RunConfig};
use log::info;
use polgrad_core::{
    agents::Agent,
    checkpoint::{checkpoint_path, load_agent, save_agent},
    env::Env,
    episode::{ActionSelection, play_episode},
    logger::{ConsoleLogger, FanoutLogger, LoggerHandle},
    rng,
};
use std::rc::Rc;
use tensorboard::TensorboardLogger;

fn run(config: &RunConfig) -> Result<()> {
    let env_type = config.env_type;
    let agent_type = config.agent.agent_type();
    if let Some(seed) = config.seed {
        rng::seed(seed);
    }
    let device = config.device()?;
    info!("environment: {env_type}, agent: {agent_type}, device: {device:?}");
    info!(
        "net: {:?}, optimizer: {:?}, lr: {}",
        config.learning_module.net.net_type,
        config.learning_module.optimizer.optimizer_type,
        config.learning_module.optimizer.lr
    );

    let env_description = env_type.make().env_description();
    let module = config.learning_module.build(&env_description, &device)?;
    let log_dir = config.log_dir();
    info!("writing metrics to {log_dir:?}");
    let logger: LoggerHandle = Rc::new(FanoutLogger::new(vec![
        Rc::new(TensorboardLogger::new(&log_dir)) as LoggerHandle,
        Rc::new(ConsoleLogger) as LoggerHandle,
    ]));
    let mut agent = config.agent.build(module, env_type, logger)?;
    let checkpoint = checkpoint_path(&config.checkpoint_dir, env_type.name(), agent_type.name());

    if config.train_steps > 0 {
        info!("training for {} iterations", config.train_steps);
        agent.train(config.train_steps)?;
        save_agent(&agent, &checkpoint)?;
    }

    if config.watch > 0 {
        if config.train_steps == 0 {
            load_agent(&mut agent, &checkpoint)?;
        }
        let mut env = env_type.make();
        let watch_seed = config.seed.unwrap_or_else(rng::random_seed);
        for episode in 0..config.watch {
            let seed = watch_seed.wrapping_add(episode as u64);
            let reward =
                play_episode(&mut env, agent.module(), ActionSelection::Sample, true, seed)?;
            info!("episode {episode}: reward {reward}");
        }
        env.close()?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = RunConfig::try_from(&args)?;
    run(&config)
}
