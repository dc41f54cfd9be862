use anyhow::Result;
use candle_core::{Device, Tensor};
use polgrad_candle_lm::{
    learning_module::{CandleLearningModule, LearningModuleBuilder},
    networks::{NetBuilder, NetType},
    optimizer::{OptimizerConfig, OptimizerType},
};
use polgrad_core::{
    env::{EnvironmentDescription, Space},
    policies::{Checkpoint, LearningModule, PolicyValue},
};

fn description() -> EnvironmentDescription {
    EnvironmentDescription::new(Space::continuous_from_dims(vec![4]), Space::Discrete(2))
}

fn module(
    net_type: NetType,
    hidden: usize,
    optimizer_type: OptimizerType,
) -> Result<CandleLearningModule> {
    let builder = LearningModuleBuilder {
        net: NetBuilder { net_type, hidden },
        optimizer: OptimizerConfig {
            optimizer_type,
            lr: 1e-2,
            max_grad_norm: Some(0.5),
        },
    };
    builder.build(&description(), &Device::Cpu)
}

fn observations() -> Result<Tensor> {
    let data: Vec<f32> = (0..12).map(|i| (i as f32 - 6.) / 4.).collect();
    Ok(Tensor::from_vec(data, (3, 4), &Device::Cpu)?)
}

fn probs(module: &CandleLearningModule) -> Result<Vec<Vec<f32>>> {
    let output = module.forward(&observations()?)?;
    Ok(output.distribution()?.probs()?.to_vec2()?)
}

fn train_step(module: &mut CandleLearningModule) -> Result<()> {
    let output = module.forward(&observations()?)?;
    let loss = output
        .logits
        .sqr()?
        .mean_all()?
        .add(&output.values()?.sqr()?.mean_all()?)?;
    module.backward_step(&loss)
}

fn assert_close(a: &[Vec<f32>], b: &[Vec<f32>]) {
    for (x, y) in a.iter().flatten().zip(b.iter().flatten()) {
        assert!((x - y).abs() < 1e-6, "{a:?} != {b:?}");
    }
}

#[test]
fn round_trip_restores_the_policy_and_optimizer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("LinearReward-v0").join("PPO.safetensors");
    std::fs::create_dir_all(path.parent().unwrap())?;
    for net_type in [NetType::Shared, NetType::Separate] {
        let mut trained = module(net_type, 16, OptimizerType::Adam)?;
        train_step(&mut trained)?;
        trained.save(&path)?;

        let mut restored = module(net_type, 16, OptimizerType::Adam)?;
        restored.load(&path)?;
        assert_close(&probs(&trained)?, &probs(&restored)?);

        // identical moments mean the next update is identical as well
        train_step(&mut trained)?;
        train_step(&mut restored)?;
        assert_close(&probs(&trained)?, &probs(&restored)?);
    }
    Ok(())
}

#[test]
fn mismatched_architecture_is_rejected_without_partial_load() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wide.safetensors");
    module(NetType::Shared, 16, OptimizerType::Adam)?.save(&path)?;

    let mut narrow = module(NetType::Shared, 8, OptimizerType::Adam)?;
    let before = probs(&narrow)?;
    assert!(narrow.load(&path).is_err());
    assert_eq!(before, probs(&narrow)?);

    let mut separate = module(NetType::Separate, 16, OptimizerType::Adam)?;
    assert!(separate.load(&path).is_err());
    Ok(())
}

#[test]
fn optimizer_state_must_match() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("adam.safetensors");
    module(NetType::Shared, 16, OptimizerType::Adam)?.save(&path)?;
    let mut sgd = module(NetType::Shared, 16, OptimizerType::Sgd)?;
    assert!(sgd.load(&path).is_err());

    let sgd_path = dir.path().join("sgd.safetensors");
    sgd.save(&sgd_path)?;
    let mut other_sgd = module(NetType::Shared, 16, OptimizerType::Sgd)?;
    other_sgd.load(&sgd_path)?;
    assert_close(&probs(&sgd)?, &probs(&other_sgd)?);
    Ok(())
}
