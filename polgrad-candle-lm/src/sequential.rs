use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder, linear};
use either::Either;

#[derive(Debug, Clone)]
pub struct Layer(pub Either<Linear, Activation>);

impl Module for Layer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match &self.0 {
            Either::Left(linear) => linear.forward(xs),
            Either::Right(activation) => activation.forward(xs),
        }
    }
}

/// Stack of linear layers with relu activations in between.
#[derive(Default, Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn add_layer(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }
}

impl Module for Sequential {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = xs.clone();
        for layer in self.layers.iter() {
            xs = layer.forward(&xs)?
        }
        Ok(xs)
    }
}

/// Builds `input_dim -> layers[0] -> ... -> layers[n - 1]`. The last layer has no activation.
/// Variables are registered as `<prefix>.<layer index>.{weight, bias}`.
pub fn build_sequential(
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> Result<Sequential> {
    let mut last_dim = input_dim;
    let mut nn = Sequential::default();
    let num_layers = layers.len();
    let vb = vb.pp(prefix);
    for (layer_idx, layer_size) in layers.iter().enumerate() {
        let layer = linear(last_dim, *layer_size, vb.pp(layer_idx.to_string()))?;
        nn = nn.add_layer(Layer(Either::Left(layer)));
        if layer_idx != num_layers - 1 {
            nn = nn.add_layer(Layer(Either::Right(Activation::Relu)));
        }
        last_dim = *layer_size;
    }
    Ok(nn)
}
