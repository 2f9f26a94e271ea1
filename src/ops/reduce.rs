use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

/// Reductions that collapse a tensor to a `[1]` scalar
#[derive(Clone, Copy)]
pub enum ReduceOp {
    Sum,  // Σ(x) - gradient broadcasts ones
    Mean, // mean(x) - gradient broadcasts 1/n
}

pub struct ReduceGradFn {
    op: ReduceOp,
    input_shape: Vec<usize>,
}

impl GradFn for ReduceGradFn {
    fn backward(&self, out_grad: &RawTensor, _parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let size: usize = self.input_shape.iter().product();
        let grad_val = match self.op {
            ReduceOp::Sum => out_grad.data[0],
            ReduceOp::Mean => out_grad.data[0] / size.max(1) as f32,
        };
        vec![Some(RawTensor::new(
            vec![grad_val; size],
            &self.input_shape,
            false,
        ))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(ReduceGradFn {
            op: self.op,
            input_shape: self.input_shape.clone(),
        })
    }
}

// ===== REDUCE OPERATIONS =====

impl RawTensor {
    pub fn reduce_op(self_t: &Tensor, op: ReduceOp) -> Tensor {
        let (result_val, shape, req_grad) = {
            let s = self_t.borrow();
            let sum: f32 = s.data.iter().sum();
            let val = match op {
                ReduceOp::Sum => sum,
                ReduceOp::Mean => sum / s.data.len().max(1) as f32,
            };
            (val, s.shape.clone(), s.requires_grad)
        };

        let out = Self::new(vec![result_val], &[1], req_grad);
        if req_grad {
            out.borrow_mut().parents = vec![self_t.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(ReduceGradFn {
                op,
                input_shape: shape,
            }));
        }
        out
    }

    pub fn sum(self_t: &Tensor) -> Tensor {
        Self::reduce_op(self_t, ReduceOp::Sum)
    }
    pub fn mean(self_t: &Tensor) -> Tensor {
        Self::reduce_op(self_t, ReduceOp::Mean)
    }
}
