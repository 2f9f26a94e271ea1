use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Binary operations: two inputs, one output
///
/// Broadcasting is automatically handled for compatible shapes.
#[derive(Clone, Copy, Debug)]
pub enum BinaryOp {
    Add, // x + y
    Sub, // x - y
    Mul, // x * y (element-wise)
    Div, // x / y (element-wise)
}

/// Gradient function for binary operations
///
/// Handles broadcasting during backward pass: gradients are summed over
/// dimensions that were broadcast in the forward pass.
pub struct BinaryGradFn {
    op: BinaryOp,
}

impl GradFn for BinaryGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let x_val = parents[0].borrow();
        let y_val = parents[1].borrow();
        let out_shape = &out_grad.shape;

        // Per-element local derivative for each side, evaluated on broadcast operands.
        let local = |for_x: bool| -> Vec<f32> {
            match self.op {
                BinaryOp::Add => out_grad.data.clone(),
                BinaryOp::Sub => {
                    if for_x {
                        out_grad.data.clone()
                    } else {
                        out_grad.data.iter().map(|&g| -g).collect()
                    }
                }
                BinaryOp::Mul => {
                    let other = if for_x { &*y_val } else { &*x_val };
                    let bc = RawTensor::broadcast_to(&other.data, &other.shape, out_shape);
                    out_grad.data.iter().zip(&bc).map(|(&g, &o)| g * o).collect()
                }
                BinaryOp::Div => {
                    let y_bc = RawTensor::broadcast_to(&y_val.data, &y_val.shape, out_shape);
                    if for_x {
                        out_grad.data.iter().zip(&y_bc).map(|(&g, &y)| g / y).collect()
                    } else {
                        let x_bc = RawTensor::broadcast_to(&x_val.data, &x_val.shape, out_shape);
                        out_grad
                            .data
                            .iter()
                            .zip(&x_bc)
                            .zip(&y_bc)
                            .map(|((&g, &x), &y)| -g * x / (y * y))
                            .collect()
                    }
                }
            }
        };

        let gx = x_val.requires_grad.then(|| {
            let summed = RawTensor::sum_over_broadcast_dims(&local(true), out_shape, &x_val.shape);
            RawTensor::new(summed, &x_val.shape, false)
        });
        let gy = y_val.requires_grad.then(|| {
            let summed = RawTensor::sum_over_broadcast_dims(&local(false), out_shape, &y_val.shape);
            RawTensor::new(summed, &y_val.shape, false)
        });
        vec![gx, gy]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(BinaryGradFn { op: self.op })
    }
}

// ===== BINARY OPERATIONS =====
impl RawTensor {
    /// Compute broadcast shape following `NumPy` broadcasting rules
    ///
    /// - (3, 1) + (1, 4) -> (3, 4)
    /// - (5, 3, 1) + (1, 4) -> (5, 3, 4)
    /// # Panics
    /// broadcast failures
    #[must_use]
    pub fn broadcast_shape(shape_a: &[usize], shape_b: &[usize]) -> Vec<usize> {
        let max_len = shape_a.len().max(shape_b.len());
        let dim_at = |shape: &[usize], i: usize| {
            if i < shape.len() { shape[shape.len() - 1 - i] } else { 1 }
        };
        let mut result = vec![1; max_len];
        for i in 0..max_len {
            let (a_dim, b_dim) = (dim_at(shape_a, i), dim_at(shape_b, i));
            result[max_len - 1 - i] = if a_dim == b_dim || b_dim == 1 {
                a_dim
            } else if a_dim == 1 {
                b_dim
            } else {
                panic!("Cannot broadcast shapes {shape_a:?} and {shape_b:?} at dimension {i}");
            };
        }
        result
    }

    /// Repeat values along dimensions where `from_shape` is 1 (or missing)
    pub(crate) fn broadcast_to(data: &[f32], from_shape: &[usize], to_shape: &[usize]) -> Vec<f32> {
        if from_shape == to_shape {
            return data.to_vec();
        }
        let to_size: usize = to_shape.iter().product();
        let offset = to_shape.len() - from_shape.len();
        let mut padded_from = vec![1; to_shape.len()];
        padded_from[offset..].copy_from_slice(from_shape);
        let from_strides = Self::compute_strides(&padded_from);
        let to_strides = Self::compute_strides(to_shape);

        (0..to_size)
            .map(|i| {
                let mut from_idx = 0;
                let mut remainder = i;
                for dim in 0..to_shape.len() {
                    let coord = remainder / to_strides[dim];
                    remainder %= to_strides[dim];
                    if padded_from[dim] != 1 {
                        from_idx += coord * from_strides[dim];
                    }
                }
                data[from_idx]
            })
            .collect()
    }

    /// Sum gradient over dimensions that were broadcast
    pub(crate) fn sum_over_broadcast_dims(
        grad: &[f32],
        grad_shape: &[usize],
        target_shape: &[usize],
    ) -> Vec<f32> {
        if grad_shape == target_shape {
            return grad.to_vec();
        }
        let offset = grad_shape.len() - target_shape.len();
        let mut padded_target = vec![1; grad_shape.len()];
        padded_target[offset..].copy_from_slice(target_shape);

        let mut result = vec![0.0; target_shape.iter().product()];
        let target_strides = Self::compute_strides(&padded_target);
        let grad_strides = Self::compute_strides(grad_shape);

        for (i, &grad_val) in grad.iter().enumerate() {
            let mut target_idx = 0;
            let mut remainder = i;
            for dim in 0..grad_shape.len() {
                let coord = remainder / grad_strides[dim];
                remainder %= grad_strides[dim];
                if padded_target[dim] != 1 {
                    target_idx += coord * target_strides[dim];
                }
            }
            result[target_idx] += grad_val;
        }
        result
    }

    /// Apply a binary operation with broadcasting
    ///
    /// # Panics
    /// broadcast failure
    pub fn binary_op(self_t: &Tensor, other: &Tensor, op: BinaryOp) -> Tensor {
        let (data_a, shape_a, req_a) = {
            let s = self_t.borrow();
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };
        let (data_b, shape_b, req_b) = {
            let o = other.borrow();
            (o.data.clone(), o.shape.clone(), o.requires_grad)
        };
        let requires_grad = req_a || req_b;

        let out_shape = Self::broadcast_shape(&shape_a, &shape_b);
        let bc_a = Self::broadcast_to(&data_a, &shape_a, &out_shape);
        let bc_b = Self::broadcast_to(&data_b, &shape_b, &out_shape);

        let result_data: Vec<f32> = bc_a
            .iter()
            .zip(&bc_b)
            .map(|(a, b)| match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
            })
            .collect();

        let out = Self::new(result_data, &out_shape, requires_grad);
        if requires_grad {
            out.borrow_mut().parents = vec![self_t.clone(), other.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(BinaryGradFn { op }));
        }
        out
    }

    pub fn add(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Add)
    }
    pub fn sub(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Sub)
    }
    pub fn elem_mul(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Mul)
    }
    pub fn div(self_t: &Tensor, other: &Tensor) -> Tensor {
        Self::binary_op(self_t, other, BinaryOp::Div)
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn bias_broadcast_over_rows() {
        let x = RawTensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false);
        let b = RawTensor::new(vec![10.0, 20.0, 30.0], &[3], true);
        let y = x.add(&b);
        assert_eq!(y.to_vec(), vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
        y.sum().backward();
        assert_eq!(b.grad().unwrap(), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn broadcast_shape_rules() {
        assert_eq!(RawTensor::broadcast_shape(&[3, 1], &[1, 4]), vec![3, 4]);
        assert_eq!(RawTensor::broadcast_shape(&[5, 3, 1], &[1, 4]), vec![5, 3, 4]);
    }

    #[test]
    #[should_panic(expected = "Cannot broadcast")]
    fn incompatible_shapes_panic() {
        RawTensor::broadcast_shape(&[2, 3], &[4]);
    }

    #[test]
    fn div_gradient_check() {
        let x = RawTensor::new(vec![1.0, 2.0, 3.0], &[3], true);
        let y = RawTensor::new(vec![2.0, 4.0, 5.0], &[3], false);
        assert!(RawTensor::check_gradients_simple(&x, |t| t.div(&y).sum()));
    }
}
