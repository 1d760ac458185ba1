use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Result, TrainError};

/// Describes one layer in a network specification.
///
/// Fields:
/// - `size`      : number of neurons in this layer
/// - `input_size`: output size of the previous layer, or the raw input
///                  dimension for the first layer
/// - `activation`: activation function applied after the linear transform
/// - `dropout`   : drop probability during training (0 disables)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub input_size: usize,
    pub activation: ActivationFunction,
    #[serde(default)]
    pub dropout: f64,
}

/// Serializable architecture description, read from the `MODEL` section of a
/// run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    /// Checks that consecutive layers line up.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(TrainError::Config("MODEL.layers must not be empty".into()));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[1].input_size != pair[0].size {
                return Err(TrainError::Config(format!(
                    "MODEL.layers[{}].input_size is {} but layer {} has {} neurons",
                    i + 1,
                    pair[1].input_size,
                    i,
                    pair[0].size
                )));
            }
        }
        if let Some(l) = self.layers.iter().find(|l| !(0.0..1.0).contains(&l.dropout)) {
            return Err(TrainError::Config(format!("dropout {} is outside [0, 1)", l.dropout)));
        }
        Ok(())
    }
}

impl Default for NetworkSpec {
    /// 2 → 8 → 2 softmax classifier.
    fn default() -> Self {
        NetworkSpec {
            layers: vec![
                LayerSpec { size: 8, input_size: 2, activation: ActivationFunction::Tanh, dropout: 0.0 },
                LayerSpec { size: 2, input_size: 8, activation: ActivationFunction::Softmax, dropout: 0.0 },
            ],
        }
    }
}
