use crate::autograd::GradFn;
use crate::ops::conv::Window2d;
use crate::{RawTensor, Tensor};

#[derive(Clone)]
struct MaxPool2dGradFn {
    max_indices: Vec<usize>,
}

impl GradFn for MaxPool2dGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let input_shape = parents[0].borrow().shape.clone();
        let mut grad_input = vec![0.0; input_shape.iter().product()];
        for (&g, &max_idx) in out_grad.data.iter().zip(&self.max_indices) {
            grad_input[max_idx] += g;
        }
        vec![Some(RawTensor::new(grad_input, &input_shape, false))]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(self.clone())
    }
}

impl RawTensor {
    /// Channels-last 2D max pooling
    ///
    /// Padded cells never win: each window only looks at in-bounds inputs,
    /// and `Window2d` guarantees every window overlaps the input.
    ///
    /// # Panics
    /// Input is not `[B, H, W, C]`
    pub fn max_pool2d(x_t: &Tensor, window: Window2d) -> Tensor {
        let (data, shape, requires_grad) = {
            let x = x_t.borrow();
            (x.data.clone(), x.shape.clone(), x.requires_grad)
        };
        assert_eq!(shape.len(), 4, "MaxPool2d expects [B, H, W, C] input");
        let (batch, channels) = (shape[0], shape[3]);
        let Window2d {
            kernel,
            stride,
            pad,
            input,
            output,
        } = window;

        let out_len = batch * output.0 * output.1 * channels;
        let mut out_data = vec![f32::NEG_INFINITY; out_len];
        let mut max_indices = vec![0usize; out_len];

        for b in 0..batch {
            for oh in 0..output.0 {
                let h_start = (oh * stride.0).saturating_sub(pad.0);
                let h_end = (oh * stride.0 + kernel.0).saturating_sub(pad.0).min(input.0);
                for ow in 0..output.1 {
                    let w_start = (ow * stride.1).saturating_sub(pad.1);
                    let w_end = (ow * stride.1 + kernel.1).saturating_sub(pad.1).min(input.1);
                    let o_base = ((b * output.0 + oh) * output.1 + ow) * channels;
                    for ih in h_start..h_end {
                        for iw in w_start..w_end {
                            let i_base = ((b * input.0 + ih) * input.1 + iw) * channels;
                            for c in 0..channels {
                                let val = data[i_base + c];
                                if val > out_data[o_base + c] {
                                    out_data[o_base + c] = val;
                                    max_indices[o_base + c] = i_base + c;
                                }
                            }
                        }
                    }
                }
            }
        }

        let out = Self::new(out_data, &[batch, output.0, output.1, channels], requires_grad);
        if requires_grad {
            out.borrow_mut().parents = vec![x_t.clone()];
            out.borrow_mut().grad_fn = Some(Box::new(MaxPool2dGradFn { max_indices }));
        }
        out
    }
}
