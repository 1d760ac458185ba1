use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, TrainError};
use crate::layers::dense::Layer;
use crate::model::model::{Mode, Model};
use crate::network::spec::NetworkSpec;
use crate::tensor::{Device, Param, Tensor};

/// Stack of dense layers. Each layer's activation is one stage of the output
/// sequence returned by `forward`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Layer>,
    #[serde(skip)]
    mode: Mode,
    #[serde(skip)]
    device: Device,
}

impl Network {
    /// Builds a network from (size, input_size, activation) tuples.
    pub fn new(layer_specs: Vec<(usize, usize, ActivationFunction)>) -> Network {
        let layers = layer_specs.into_iter()
            .map(|(size, input_size, activation)| Layer::new(size, input_size, activation))
            .collect();
        Network { layers, mode: Mode::Train, device: Device::Cpu }
    }

    pub fn from_spec(spec: &NetworkSpec) -> Result<Network> {
        spec.validate()?;
        let layers = spec.layers.iter()
            .map(|l| Layer::new(l.size, l.input_size, l.activation.clone()).with_dropout(l.dropout))
            .collect();
        Ok(Network { layers, mode: Mode::Train, device: Device::Cpu })
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.input_size())
    }
}

impl Model for Network {
    fn forward(&mut self, input: &Tensor) -> Result<Vec<Tensor>> {
        input.ensure_on(self.device)?;
        if input.cols() != self.input_size() {
            return Err(TrainError::Shape(format!(
                "network expects {} input features, got {}",
                self.input_size(),
                input.cols()
            )));
        }

        let mut outputs = Vec::with_capacity(self.layers.len());
        let mut current = input.data().clone();
        for layer in &mut self.layers {
            current = layer.feed_from(&current, self.mode);
            outputs.push(Tensor::on(current.clone(), self.device));
        }
        Ok(outputs)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<()> {
        grad_output.ensure_on(self.device)?;
        let mut delta = grad_output.data().clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.compute_gradients(&delta);
        }
        Ok(())
    }

    fn params(&self) -> Vec<&Param> {
        self.layers.iter().flat_map(|l| [&l.weights, &l.biases]).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Param> {
        self.layers.iter_mut().flat_map(|l| [&mut l.weights, &mut l.biases]).collect()
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn device(&self) -> Device {
        self.device
    }

    fn to_device(&mut self, device: Device) {
        for layer in &mut self.layers {
            layer.to_device(device);
        }
        self.device = device;
    }
}
