use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Movement operations: change layout or shape without arithmetic
#[derive(Clone, Debug)]
pub enum MovementOp {
    Reshape,
    /// Joined along `axis`; `sizes` holds each parent's extent on that axis.
    Concat { axis: usize, sizes: Vec<usize> },
}

/// Gradient function for movement operations
pub struct MovementGradFn {
    op: MovementOp,
}

impl GradFn for MovementGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        match &self.op {
            MovementOp::Reshape => {
                let original_shape = parents[0].borrow().shape.clone();
                vec![Some(RawTensor::new(
                    out_grad.data.clone(),
                    &original_shape,
                    false,
                ))]
            }
            MovementOp::Concat { axis, sizes } => {
                let outer: usize = out_grad.shape[..*axis].iter().product();
                let inner: usize = out_grad.shape[axis + 1..].iter().product();
                let total = out_grad.shape[*axis];
                let mut offset = 0;
                sizes
                    .iter()
                    .zip(parents)
                    .map(|(&size, parent)| {
                        let mut grad = Vec::with_capacity(outer * size * inner);
                        for o in 0..outer {
                            let start = (o * total + offset) * inner;
                            grad.extend_from_slice(&out_grad.data[start..start + size * inner]);
                        }
                        offset += size;
                        let shape = parent.borrow().shape.clone();
                        Some(RawTensor::new(grad, &shape, false))
                    })
                    .collect()
            }
        }
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(MovementGradFn {
            op: self.op.clone(),
        })
    }
}

// ===== MOVEMENT OPERATIONS =====
impl RawTensor {
    /// Reshape tensor to new shape (same number of elements)
    ///
    /// # Panics
    /// Element counts differ
    pub fn reshape(self_t: &Tensor, new_shape: &[usize]) -> Tensor {
        let (data, old_shape, req_grad) = {
            let s = self_t.borrow();
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };
        let old_size: usize = old_shape.iter().product();
        let new_size: usize = new_shape.iter().product();
        assert_eq!(old_size, new_size, "Cannot reshape: size mismatch");

        let out = Self::new(data, new_shape, req_grad);
        if req_grad {
            out.borrow_mut().parents = vec![self_t.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(MovementGradFn {
                op: MovementOp::Reshape,
            }));
        }
        out
    }

    /// Concatenate tensors along `axis`; all other dimensions must agree
    ///
    /// # Panics
    /// Empty input, rank mismatch, or differing non-axis dimensions
    pub fn concat(tensors: &[Tensor], axis: usize) -> Tensor {
        assert!(!tensors.is_empty(), "concat needs at least one tensor");
        let first_shape = tensors[0].borrow().shape.clone();
        assert!(axis < first_shape.len(), "concat axis {axis} out of range");

        let mut sizes = Vec::with_capacity(tensors.len());
        let mut requires_grad = false;
        for t in tensors {
            let t = t.borrow();
            assert_eq!(t.shape.len(), first_shape.len(), "concat rank mismatch");
            for (d, (&a, &b)) in t.shape.iter().zip(&first_shape).enumerate() {
                assert!(d == axis || a == b, "concat shape mismatch at dim {d}");
            }
            sizes.push(t.shape[axis]);
            requires_grad |= t.requires_grad;
        }

        let outer: usize = first_shape[..axis].iter().product();
        let inner: usize = first_shape[axis + 1..].iter().product();
        let total: usize = sizes.iter().sum();
        let mut data = Vec::with_capacity(outer * total * inner);
        for o in 0..outer {
            for (t, &size) in tensors.iter().zip(&sizes) {
                let t = t.borrow();
                let start = o * size * inner;
                data.extend_from_slice(&t.data[start..start + size * inner]);
            }
        }

        let mut out_shape = first_shape;
        out_shape[axis] = total;
        let out = Self::new(data, &out_shape, requires_grad);
        if requires_grad {
            out.borrow_mut().parents = tensors.to_vec();
            out.borrow_mut().grad_fn = Some(Box::new(MovementGradFn {
                op: MovementOp::Concat { axis, sizes },
            }));
        }
        out
    }

    /// Row-major strides for `shape`
    pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }
}

#[cfg(test)]
mod tests {
    use crate::tensor::{RawTensor, TensorOps};

    #[test]
    fn concat_last_axis_interleaves_rows() {
        let a = RawTensor::new(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], false);
        let b = RawTensor::new(vec![5.0, 6.0], &[2, 1], false);
        let c = RawTensor::concat(&[a, b], 1);
        assert_eq!(c.shape(), vec![2, 3]);
        assert_eq!(c.to_vec(), vec![1.0, 2.0, 5.0, 3.0, 4.0, 6.0]);
    }

    #[test]
    fn concat_routes_gradients_back() {
        let a = RawTensor::new(vec![1.0, 2.0, 3.0, 4.0], &[2, 2], true);
        let b = RawTensor::new(vec![5.0, 6.0], &[2, 1], true);
        let weights = RawTensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], false);
        RawTensor::concat(&[a.clone(), b.clone()], 1)
            .elem_mul(&weights)
            .sum()
            .backward();
        assert_eq!(a.grad().unwrap(), vec![1.0, 2.0, 4.0, 5.0]);
        assert_eq!(b.grad().unwrap(), vec![3.0, 6.0]);
    }

    #[test]
    fn strides_row_major() {
        assert_eq!(RawTensor::compute_strides(&[2, 3, 4]), vec![12, 4, 1]);
    }
}
