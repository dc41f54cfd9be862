use crate::{agents::Agent, policies::Checkpoint};
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_EXTENSION: &str = "safetensors";

/// `<dir>/<env_name>/<agent_name>.safetensors`
pub fn checkpoint_path(dir: impl AsRef<Path>, env_name: &str, agent_name: &str) -> PathBuf {
    dir.as_ref()
        .join(env_name)
        .join(format!("{agent_name}.{CHECKPOINT_EXTENSION}"))
}

pub fn save_agent<A>(agent: &A, path: &Path) -> Result<()>
where
    A: Agent,
    A::Module: Checkpoint,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("could not create checkpoint directory {parent:?}"))?;
    }
    agent.module().save(path)?;
    info!("saved checkpoint to {path:?}");
    Ok(())
}

pub fn load_agent<A>(agent: &mut A, path: &Path) -> Result<()>
where
    A: Agent,
    A::Module: Checkpoint,
{
    agent
        .module_mut()
        .load(path)
        .with_context(|| format!("could not load checkpoint {path:?}"))?;
    info!("loaded checkpoint from {path:?}");
    Ok(())
}
