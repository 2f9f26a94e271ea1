use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Unary operations: single input, single output
///
/// - Neg: d(-x)/dx = -1
/// - Exp: d(eˣ)/dx = eˣ
/// - Log: d(ln(x))/dx = 1/x
/// - Tanh: d(tanh(x))/dx = 1 - tanh²(x)
/// - Sigmoid: d(σ(x))/dx = σ(x)·(1-σ(x))
/// - `ReLU`: d(max(0,x))/dx = x > 0 ? 1 : 0
/// - `LeakyReLU`: x > 0 ? 1 : alpha
#[derive(Clone, Copy, Debug)]
pub enum UnaryOp {
    Neg,
    Exp,
    Log,
    Tanh,
    Sigmoid,
    ReLU,
    LeakyReLU(f32),
}

impl UnaryOp {
    fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Neg => -x,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => x.ln(),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::ReLU => x.max(0.0),
            UnaryOp::LeakyReLU(alpha) => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
        }
    }

    fn derivative(self, x: f32) -> f32 {
        match self {
            UnaryOp::Neg => -1.0,
            UnaryOp::Exp => x.exp(),
            UnaryOp::Log => 1.0 / x,
            UnaryOp::Tanh => {
                let t = x.tanh();
                t.mul_add(-t, 1.0)
            }
            UnaryOp::Sigmoid => {
                let s = 1.0 / (1.0 + (-x).exp());
                s * (1.0 - s)
            }
            UnaryOp::ReLU => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            UnaryOp::LeakyReLU(alpha) => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
        }
    }
}

/// Gradient function for unary operations
pub struct UnaryGradFn {
    op: UnaryOp,
}

impl GradFn for UnaryGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let x = parents[0].borrow();
        // ∂L/∂x = ∂L/∂y · f'(x)
        let grad_data: Vec<f32> = out_grad
            .data
            .iter()
            .zip(&x.data)
            .map(|(&g, &x)| g * self.op.derivative(x))
            .collect();
        vec![Some(RawTensor::new(grad_data, &x.shape, false))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(Self { op: self.op })
    }
}

impl RawTensor {
    pub fn unary_op(t: &Tensor, op: UnaryOp) -> Tensor {
        let (data, shape, requires_grad) = {
            let s = t.borrow();
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };
        let result: Vec<f32> = data.iter().map(|&x| op.apply(x)).collect();
        let out = Self::new(result, &shape, requires_grad);
        if requires_grad {
            out.borrow_mut().parents = vec![t.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(UnaryGradFn { op }));
        }
        out
    }

    pub fn neg(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Neg)
    }
    pub fn exp(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Exp)
    }
    pub fn log(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Log)
    }
    pub fn tanh(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Tanh)
    }
    pub fn sigmoid(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::Sigmoid)
    }
    pub fn relu(t: &Tensor) -> Tensor {
        Self::unary_op(t, UnaryOp::ReLU)
    }
    pub fn leaky_relu(t: &Tensor, alpha: f32) -> Tensor {
        Self::unary_op(t, UnaryOp::LeakyReLU(alpha))
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn relu_zeroes_negatives() {
        let x = RawTensor::new(vec![-1.0, 0.0, 2.0], &[3], false);
        assert_eq!(x.relu().to_vec(), vec![0.0, 0.0, 2.0]);
    }

    #[test]
    fn leaky_relu_scales_negatives() {
        let x = RawTensor::new(vec![-2.0, 3.0], &[2], false);
        assert_eq!(x.leaky_relu(0.1).to_vec(), vec![-0.2, 3.0]);
    }

    #[test]
    fn smooth_activations_gradcheck() {
        let x = RawTensor::new(vec![-0.8, 0.1, 0.9, 1.7], &[4], true);
        assert!(RawTensor::check_gradients_simple(&x, |t| t.tanh().sum()));
        let x = RawTensor::new(vec![-0.8, 0.1, 0.9, 1.7], &[4], true);
        assert!(RawTensor::check_gradients_simple(&x, |t| t.sigmoid().sum()));
    }
}
