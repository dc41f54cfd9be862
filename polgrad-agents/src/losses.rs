use anyhow::Result;
use candle_core::Tensor;
use polgrad_core::tensors::{Entropy, PolicyLoss, ValueLoss};

/// `-mean(logp * weight)`, the score function estimator for returns or advantages `weights`.
pub fn policy_gradient_loss(logps: &Tensor, weights: &Tensor) -> Result<PolicyLoss> {
    Ok(PolicyLoss(logps.mul(weights)?.mean_all()?.neg()?))
}

/// PPO's clipped surrogate objective, negated so that it can be minimized:
/// `-mean(min(ratio * A, clip(ratio, 1 - eps, 1 + eps) * A))`.
pub fn clipped_surrogate(
    ratio: &Tensor,
    advantages: &Tensor,
    clip_eps: f32,
) -> Result<PolicyLoss> {
    let unclipped = ratio.mul(advantages)?;
    let clipped = ratio.clamp(1. - clip_eps, 1. + clip_eps)?.mul(advantages)?;
    Ok(PolicyLoss(
        Tensor::minimum(&unclipped, &clipped)?.mean_all()?.neg()?,
    ))
}

/// Mean squared error between predicted values and targets.
pub fn value_loss(values: &Tensor, returns: &Tensor) -> Result<ValueLoss> {
    Ok(ValueLoss(values.sub(returns)?.sqr()?.mean_all()?))
}

pub fn mean_entropy(entropy: &Tensor) -> Result<Entropy> {
    Ok(Entropy(entropy.mean_all()?))
}

/// `policy_loss + value_loss - entropy_reg * entropy`
pub fn total_loss(
    policy_loss: &PolicyLoss,
    value_loss: Option<&ValueLoss>,
    entropy: &Entropy,
    entropy_reg: f32,
) -> Result<Tensor> {
    let mut loss = policy_loss.sub(&entropy.affine(entropy_reg as f64, 0.)?)?;
    if let Some(value_loss) = value_loss {
        loss = loss.add(value_loss)?;
    }
    Ok(loss)
}

/// Share of ratios outside `[1 - eps, 1 + eps]`.
pub fn clip_fraction(ratios: &[f32], clip_eps: f32) -> f32 {
    if ratios.is_empty() {
        return 0.;
    }
    let clipped = ratios
        .iter()
        .filter(|ratio| (**ratio - 1.).abs() > clip_eps)
        .count();
    clipped as f32 / ratios.len() as f32
}

/// Population mean and standard deviation.
pub fn mean_and_std(xs: &[f32]) -> (f32, f32) {
    if xs.is_empty() {
        return (0., 0.);
    }
    let len = xs.len() as f32;
    let mean = xs.iter().sum::<f32>() / len;
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / len;
    (mean, variance.sqrt())
}
