use crate::error::Result;
use crate::tensor::{Device, Param, Tensor};

/// Execution mode of a model.
///
/// `Train` tracks gradients and enables stochastic layers (dropout);
/// `Eval` makes every layer deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Contract every trainable model satisfies.
///
/// `forward` returns one tensor per stage; only the last one is the final
/// output consumed by losses and result hooks. `backward` consumes the
/// gradient of the loss with respect to that final output and accumulates
/// into each parameter's gradient buffer, using activations cached by the
/// most recent `forward`.
pub trait Model {
    fn forward(&mut self, input: &Tensor) -> Result<Vec<Tensor>>;

    fn backward(&mut self, grad_output: &Tensor) -> Result<()>;

    fn params(&self) -> Vec<&Param>;

    fn params_mut(&mut self) -> Vec<&mut Param>;

    fn set_mode(&mut self, mode: Mode);

    fn mode(&self) -> Mode;

    fn device(&self) -> Device;

    fn to_device(&mut self, device: Device);

    fn zero_grad(&mut self) {
        for p in self.params_mut() {
            p.zero_grad();
        }
    }
}
