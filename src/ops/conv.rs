use crate::autograd::GradFn;
use crate::error::{GraphError, Result};
use crate::{RawTensor, Tensor};
use serde::{Deserialize, Serialize};

/// Spatial padding policy for sliding-window ops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Padding {
    /// Output size is `ceil(in / stride)`; missing cells are padded, the odd
    /// one on the bottom/right.
    #[default]
    Same,
    /// No padding; output size is `floor((in - k) / stride) + 1`.
    Valid,
}

/// Resolved geometry of a 2D sliding window over one spatial extent pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window2d {
    pub kernel: (usize, usize),
    pub stride: (usize, usize),
    /// Top and left padding; bottom/right padding is implied by `output`.
    pub pad: (usize, usize),
    pub input: (usize, usize),
    pub output: (usize, usize),
}

impl Padding {
    /// Output extent of a window of size `k` sliding with stride `s` over `size`
    ///
    /// # Errors
    /// `InvalidParameter` for a zero window or stride, or a VALID window
    /// wider than the input
    pub fn output_extent(self, size: usize, k: usize, s: usize) -> Result<usize> {
        if k == 0 || s == 0 {
            return Err(GraphError::InvalidParameter(format!(
                "window {k} with stride {s}: both must be positive"
            )));
        }
        match self {
            Padding::Same => Ok(size.div_ceil(s)),
            Padding::Valid if size < k => Err(GraphError::InvalidParameter(format!(
                "window {k} larger than input {size} with VALID padding"
            ))),
            Padding::Valid => Ok((size - k) / s + 1),
        }
    }
}

impl Window2d {
    pub fn new(
        input: (usize, usize),
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: Padding,
    ) -> Result<Self> {
        if kernel.0 == 0 || kernel.1 == 0 {
            return Err(GraphError::InvalidParameter(format!(
                "kernel size must be positive, got {kernel:?}"
            )));
        }
        if stride.0 == 0 || stride.1 == 0 {
            return Err(GraphError::InvalidParameter(format!(
                "stride must be positive, got {stride:?}"
            )));
        }
        let axis = |size: usize, k: usize, s: usize| -> Result<(usize, usize)> {
            let out = padding.output_extent(size, k, s)?;
            let pad = match padding {
                Padding::Same => ((out.max(1) - 1) * s + k).saturating_sub(size) / 2,
                Padding::Valid => 0,
            };
            Ok((out, pad))
        };
        let (out_h, pad_top) = axis(input.0, kernel.0, stride.0)?;
        let (out_w, pad_left) = axis(input.1, kernel.1, stride.1)?;
        Ok(Self {
            kernel,
            stride,
            pad: (pad_top, pad_left),
            input,
            output: (out_h, out_w),
        })
    }

    /// Input coordinate for output position `o` and kernel offset `k`, if in bounds
    #[inline]
    fn source(o: usize, k: usize, stride: usize, pad: usize, size: usize) -> Option<usize> {
        (o * stride + k).checked_sub(pad).filter(|&i| i < size)
    }
}

#[derive(Clone)]
struct Conv2dGradFn {
    window: Window2d,
}

impl GradFn for Conv2dGradFn {
    fn backward(&self, out_grad: &RawTensor, parents: &[Tensor]) -> Vec<Option<Tensor>> {
        let x = parents[0].borrow();
        let w = parents[1].borrow();
        let (batch, in_c) = (x.shape[0], x.shape[3]);
        let out_c = w.shape[3];
        let Window2d {
            kernel,
            stride,
            pad,
            input,
            output,
        } = self.window;

        let mut grad_x = x.requires_grad.then(|| vec![0.0; x.data.len()]);
        let mut grad_w = w.requires_grad.then(|| vec![0.0; w.data.len()]);

        for b in 0..batch {
            for oh in 0..output.0 {
                for ow in 0..output.1 {
                    let g_base = ((b * output.0 + oh) * output.1 + ow) * out_c;
                    let g_row = &out_grad.data[g_base..g_base + out_c];
                    for kh in 0..kernel.0 {
                        let Some(ih) = Window2d::source(oh, kh, stride.0, pad.0, input.0) else {
                            continue;
                        };
                        for kw in 0..kernel.1 {
                            let Some(iw) = Window2d::source(ow, kw, stride.1, pad.1, input.1)
                            else {
                                continue;
                            };
                            let x_base = ((b * input.0 + ih) * input.1 + iw) * in_c;
                            for c in 0..in_c {
                                let w_base = ((kh * kernel.1 + kw) * in_c + c) * out_c;
                                let w_row = &w.data[w_base..w_base + out_c];
                                if let Some(gx) = grad_x.as_mut() {
                                    gx[x_base + c] +=
                                        g_row.iter().zip(w_row).map(|(g, w)| g * w).sum::<f32>();
                                }
                                if let Some(gw) = grad_w.as_mut() {
                                    let xv = x.data[x_base + c];
                                    for (slot, g) in gw[w_base..w_base + out_c].iter_mut().zip(g_row)
                                    {
                                        *slot += xv * g;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        vec![
            grad_x.map(|g| RawTensor::new(g, &x.shape, false)),
            grad_w.map(|g| RawTensor::new(g, &w.shape, false)),
        ]
    }

    fn clone_box(&self) -> Box<dyn GradFn> {
        Box::new(self.clone())
    }
}

impl RawTensor {
    /// Channels-last 2D convolution
    ///
    /// `x` is `[batch, height, width, in_channels]`, `weight` is
    /// `[kernel_h, kernel_w, in_channels, out_channels]`; the result is
    /// `[batch, out_h, out_w, out_channels]`.
    ///
    /// # Panics
    /// Input rank or channel count disagrees with the weight
    pub fn conv2d(x_t: &Tensor, weight: &Tensor, window: Window2d) -> Tensor {
        let (x_data, x_shape, x_req) = {
            let x = x_t.borrow();
            (x.data.clone(), x.shape.clone(), x.requires_grad)
        };
        let (w_data, w_shape, w_req) = {
            let w = weight.borrow();
            (w.data.clone(), w.shape.clone(), w.requires_grad)
        };
        assert_eq!(x_shape.len(), 4, "conv2d expects [B, H, W, C] input");
        assert_eq!(x_shape[3], w_shape[2], "conv2d channel mismatch");
        let (batch, in_c, out_c) = (x_shape[0], x_shape[3], w_shape[3]);
        let Window2d {
            kernel,
            stride,
            pad,
            input,
            output,
        } = window;

        let mut out = vec![0.0; batch * output.0 * output.1 * out_c];
        for b in 0..batch {
            for oh in 0..output.0 {
                for ow in 0..output.1 {
                    let o_base = ((b * output.0 + oh) * output.1 + ow) * out_c;
                    for kh in 0..kernel.0 {
                        let Some(ih) = Window2d::source(oh, kh, stride.0, pad.0, input.0) else {
                            continue;
                        };
                        for kw in 0..kernel.1 {
                            let Some(iw) = Window2d::source(ow, kw, stride.1, pad.1, input.1)
                            else {
                                continue;
                            };
                            let x_base = ((b * input.0 + ih) * input.1 + iw) * in_c;
                            for c in 0..in_c {
                                let xv = x_data[x_base + c];
                                let w_base = ((kh * kernel.1 + kw) * in_c + c) * out_c;
                                for (slot, &wv) in out[o_base..o_base + out_c]
                                    .iter_mut()
                                    .zip(&w_data[w_base..w_base + out_c])
                                {
                                    *slot += xv * wv;
                                }
                            }
                        }
                    }
                }
            }
        }

        let requires_grad = x_req || w_req;
        let result = Self::new(out, &[batch, output.0, output.1, out_c], requires_grad);
        if requires_grad {
            result.borrow_mut().parents = vec![x_t.clone(), weight.clone()];
            result.borrow_mut().grad_fn = Some(Box::new(Conv2dGradFn { window }));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::TensorOps;

    #[test]
    fn same_padding_geometry() {
        let w = Window2d::new((24, 24), (5, 5), (1, 1), Padding::Same).unwrap();
        assert_eq!(w.output, (24, 24));
        assert_eq!(w.pad, (2, 2));

        let w = Window2d::new((24, 24), (3, 3), (2, 2), Padding::Same).unwrap();
        assert_eq!(w.output, (12, 12));
        assert_eq!(w.pad, (0, 0));
    }

    #[test]
    fn valid_padding_geometry() {
        let w = Window2d::new((8, 8), (3, 3), (2, 2), Padding::Valid).unwrap();
        assert_eq!(w.output, (3, 3));
        assert!(Window2d::new((2, 2), (3, 3), (1, 1), Padding::Valid).is_err());
    }

    #[test]
    fn identity_kernel_copies_input() {
        let x = RawTensor::new((0..9).map(|v| v as f32).collect(), &[1, 3, 3, 1], false);
        let mut k = vec![0.0; 9];
        k[4] = 1.0;
        let w = RawTensor::new(k, &[3, 3, 1, 1], false);
        let window = Window2d::new((3, 3), (3, 3), (1, 1), Padding::Same).unwrap();
        let y = RawTensor::conv2d(&x, &w, window);
        assert_eq!(y.shape(), vec![1, 3, 3, 1]);
        assert_eq!(y.to_vec(), x.to_vec());
    }

    #[test]
    fn conv2d_gradcheck_input_and_weight() {
        let window = Window2d::new((4, 4), (3, 3), (2, 2), Padding::Same).unwrap();
        let x_vals: Vec<f32> = (0..32).map(|i| (i as f32 * 0.37).sin()).collect();
        let w_vals: Vec<f32> = (0..54).map(|i| (i as f32 * 0.21).cos() * 0.5).collect();

        let x = RawTensor::new(x_vals.clone(), &[1, 4, 4, 2], true);
        let w_fixed = RawTensor::new(w_vals.clone(), &[3, 3, 2, 3], false);
        assert!(RawTensor::check_gradients_simple(&x, |t| {
            RawTensor::conv2d(t, &w_fixed, window).sum()
        }));

        let x_fixed = RawTensor::new(x_vals, &[1, 4, 4, 2], false);
        let w = RawTensor::new(w_vals, &[3, 3, 2, 3], true);
        assert!(RawTensor::check_gradients_simple(&w, |t| {
            RawTensor::conv2d(&x_fixed, t, window).sum()
        }));
    }
}
