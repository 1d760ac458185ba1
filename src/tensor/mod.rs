pub mod device;
pub mod param;
pub mod tensor;

pub use device::Device;
pub use param::Param;
pub use tensor::Tensor;
