use crate::error::{GraphError, Result};
use crate::nn::activation::apply_opt;
use crate::nn::{Activation, Initializer, Layer, LayerConfig, Shape, single_input, single_tensor};
use crate::ops::{Padding, Window2d};
use crate::tensor::{RawTensor, Tensor, TensorOps};

/// Symbolic `[B, H', W', C]` after a sliding window over `[B, H, W, C]`
pub(crate) fn windowed_shape(
    kind: &str,
    shape: &Shape,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: Padding,
    channels: Option<usize>,
) -> Result<Shape> {
    let [batch, h, w, c] = shape.as_slice() else {
        return Err(GraphError::Graph(format!(
            "{kind} expects [batch, height, width, channels], got {shape:?}"
        )));
    };
    let extent = |size: &Option<usize>, k: usize, s: usize| -> Result<Option<usize>> {
        size.map(|n| padding.output_extent(n, k, s)).transpose()
    };
    Ok(vec![
        *batch,
        extent(h, kernel.0, stride.0)?,
        extent(w, kernel.1, stride.1)?,
        channels.or(*c),
    ])
}

/// Channels-last 2D convolution layer
///
/// Weights are `[filter_h, filter_w, in_channels, n_filter]`. When
/// `in_channels` is not given the weights are allocated on the first call.
pub struct Conv2d {
    name: Option<String>,
    n_filter: usize,
    filter_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
    act: Option<Activation>,
    w_init: Initializer,
    b_init: Option<Initializer>,
    in_channels: Option<usize>,
    weights: Option<Tensor>,
    biases: Option<Tensor>,
}

impl Conv2d {
    pub fn new(n_filter: usize) -> Self {
        Conv2d {
            name: None,
            n_filter,
            filter_size: (3, 3),
            strides: (1, 1),
            padding: Padding::Same,
            act: None,
            w_init: Initializer::truncated_normal(0.02),
            b_init: Some(Initializer::constant(0.0)),
            in_channels: None,
            weights: None,
            biases: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn filter_size(mut self, filter_size: (usize, usize)) -> Self {
        self.filter_size = filter_size;
        self.reallocate()
    }
    pub fn strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }
    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }
    pub fn act(mut self, act: Activation) -> Self {
        self.act = Some(act);
        self
    }
    pub fn w_init(mut self, w_init: Initializer) -> Self {
        self.w_init = w_init;
        self.reallocate()
    }
    /// `None` disables the bias
    pub fn b_init(mut self, b_init: Option<Initializer>) -> Self {
        self.b_init = b_init;
        self.reallocate()
    }
    /// Fix the input channel count and allocate weights now
    pub fn in_channels(mut self, in_channels: usize) -> Self {
        self.in_channels = Some(in_channels);
        self.reallocate()
    }

    fn reallocate(mut self) -> Self {
        if let Some(c) = self.in_channels {
            self.allocate(c);
        }
        self
    }

    fn allocate(&mut self, in_channels: usize) {
        let (kh, kw) = self.filter_size;
        self.weights = Some(self.w_init.init(&[kh, kw, in_channels, self.n_filter]));
        self.biases = self.b_init.map(|init| init.init(&[self.n_filter]));
    }

    pub fn weights(&self) -> Option<&Tensor> {
        self.weights.as_ref()
    }
}

impl Layer for Conv2d {
    fn kind(&self) -> &'static str {
        "Conv2d"
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn build(&mut self, input_shapes: &[Shape]) -> Result<()> {
        let shape = single_input("Conv2d", input_shapes)?;
        let Some(channels) = shape.get(3).copied().flatten() else {
            return Err(GraphError::Graph(format!(
                "Conv2d needs a known channel dimension, got {shape:?}"
            )));
        };
        match self.in_channels {
            Some(expected) if expected != channels => Err(GraphError::ShapeMismatch {
                context: format!("{} input channels", self.name.as_deref().unwrap_or("Conv2d")),
                expected: vec![None, None, None, Some(expected)],
                actual: shape.clone(),
            }),
            Some(_) if self.weights.is_some() => Ok(()),
            _ => {
                self.in_channels = Some(channels);
                self.allocate(channels);
                Ok(())
            }
        }
    }
    fn is_built(&self) -> bool {
        self.weights.is_some()
    }

    fn output_shape(&self, input_shapes: &[Shape]) -> Result<Shape> {
        let shape = single_input("Conv2d", input_shapes)?;
        windowed_shape(
            "Conv2d",
            shape,
            self.filter_size,
            self.strides,
            self.padding,
            Some(self.n_filter),
        )
    }

    fn forward(&self, inputs: &[Tensor], _training: bool) -> Result<Tensor> {
        let x = single_tensor("Conv2d", inputs)?;
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| GraphError::NotBuilt(self.name.clone().unwrap_or_default()))?;
        let shape = x.borrow().shape.clone();
        let &[_, h, w, c] = shape.as_slice() else {
            return Err(GraphError::ShapeMismatch {
                context: "Conv2d input".into(),
                expected: vec![None, None, None, self.in_channels],
                actual: shape.iter().map(|&d| Some(d)).collect(),
            });
        };
        if Some(c) != self.in_channels {
            return Err(GraphError::ShapeMismatch {
                context: "Conv2d input".into(),
                expected: vec![None, None, None, self.in_channels],
                actual: shape.iter().map(|&d| Some(d)).collect(),
            });
        }
        let window = Window2d::new((h, w), self.filter_size, self.strides, self.padding)?;
        let mut out = RawTensor::conv2d(x, weights, window);
        if let Some(b) = &self.biases {
            out = out.add(b);
        }
        Ok(apply_opt(self.act, out))
    }

    fn parameters(&self) -> Vec<(String, Tensor)> {
        let mut params = Vec::new();
        if let Some(w) = &self.weights {
            params.push(("weights".to_string(), w.clone()));
        }
        if let Some(b) = &self.biases {
            params.push(("biases".to_string(), b.clone()));
        }
        params
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Conv2d {
            n_filter: self.n_filter,
            filter_size: self.filter_size,
            strides: self.strides,
            padding: self.padding,
            act: self.act,
            w_init: self.w_init,
            b_init: self.b_init,
            in_channels: self.in_channels,
        }
    }
}
