use crate::tensor::Tensor;

pub mod adam;
pub mod sgd;

pub use adam::Adam;
pub use sgd::SGD;

/// First-order optimizer over a fixed set of parameters
pub trait Optimizer {
    fn params(&self) -> &[Tensor];

    /// Update every parameter that has an accumulated gradient
    fn step(&mut self);

    /// Must be called before each backward pass; gradients accumulate otherwise
    fn zero_grad(&self) {
        for param in self.params() {
            param.borrow_mut().grad = None;
        }
    }

    fn learning_rate(&self) -> f32;
    fn set_learning_rate(&mut self, lr: f32);
}
