use crate::autograd::GradFn;
use crate::{RawTensor, Tensor};

// ===== MATRIX MULTIPLICATION =====

impl RawTensor {
    /// Transpose a row-major `[m, n]` buffer into `[n, m]`
    pub(crate) fn transpose_2d(data: &[f32], shape: &[usize]) -> Vec<f32> {
        assert_eq!(shape.len(), 2, "Transpose expects 2D shape");
        let (m, n) = (shape[0], shape[1]);
        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                result[j * m + i] = data[i * n + j];
            }
        }
        result
    }

    /// Raw matrix multiplication: (m,k) @ (k,n) -> (m,n)
    ///
    /// i-p-j loop order keeps the inner loop on contiguous rows of `b`.
    pub fn matmul_raw(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
        let mut result = vec![0.0; m * n];
        for i in 0..m {
            let out_row = &mut result[i * n..(i + 1) * n];
            for p in 0..k {
                let a_ip = a[i * k + p];
                if a_ip == 0.0 {
                    continue;
                }
                let b_row = &b[p * n..(p + 1) * n];
                for (o, &bv) in out_row.iter_mut().zip(b_row) {
                    *o += a_ip * bv;
                }
            }
        }
        result
    }

    /// 2D matrix multiplication: (m,n) @ (n,p) -> (m,p)
    ///
    /// # Panics
    /// Non-2D operands or mismatched inner dimensions
    pub fn matmul(self_t: &Tensor, other: &Tensor) -> Tensor {
        let (data_a, shape_a, req_a) = {
            let s = self_t.borrow();
            (s.data.clone(), s.shape.clone(), s.requires_grad)
        };
        let (data_b, shape_b, req_b) = {
            let o = other.borrow();
            (o.data.clone(), o.shape.clone(), o.requires_grad)
        };
        assert!(
            shape_a.len() == 2 && shape_b.len() == 2,
            "Matmul not supported for shapes: {shape_a:?} @ {shape_b:?}"
        );
        let (m, n) = (shape_a[0], shape_a[1]);
        let (n2, p) = (shape_b[0], shape_b[1]);
        assert_eq!(n, n2, "Matmul dimension mismatch: ({m},{n}) @ ({n2},{p})");

        let result_data = Self::matmul_raw(&data_a, &data_b, m, n, p);
        let out = Self::new(result_data, &[m, p], req_a || req_b);
        if req_a || req_b {
            out.borrow_mut().parents = vec![self_t.clone(), other.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(MatMulGradFn));
        }
        out
    }
}

/// Gradient function for matrix multiplication
///
/// For z = x @ y:
/// - ∂L/∂x = ∂L/∂z @ y^T
/// - ∂L/∂y = x^T @ ∂L/∂z
pub struct MatMulGradFn;

impl GradFn for MatMulGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let x = parents[0].borrow();
        let y = parents[1].borrow();

        let grad_x = x.requires_grad.then(|| {
            let y_t = RawTensor::transpose_2d(&y.data, &y.shape);
            let grad_data = RawTensor::matmul_raw(
                &out_grad.data,
                &y_t,
                out_grad.shape[0],
                out_grad.shape[1],
                y.shape[0],
            );
            RawTensor::new(grad_data, &x.shape, false)
        });
        let grad_y = y.requires_grad.then(|| {
            let x_t = RawTensor::transpose_2d(&x.data, &x.shape);
            let grad_data = RawTensor::matmul_raw(
                &x_t,
                &out_grad.data,
                x.shape[1],
                x.shape[0],
                out_grad.shape[1],
            );
            RawTensor::new(grad_data, &y.shape, false)
        });

        vec![grad_x, grad_y]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(MatMulGradFn)
    }
}
