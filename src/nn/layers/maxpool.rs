use crate::error::{GraphError, Result};
use crate::nn::layers::conv::windowed_shape;
use crate::nn::{Layer, LayerConfig, Shape, single_input, single_tensor};
use crate::ops::{Padding, Window2d};
use crate::tensor::{RawTensor, Tensor};

/// 2D max pooling over channels-last `[B, H, W, C]` tensors
pub struct MaxPool2d {
    name: Option<String>,
    filter_size: (usize, usize),
    strides: (usize, usize),
    padding: Padding,
}

impl Default for MaxPool2d {
    fn default() -> Self {
        Self {
            name: None,
            filter_size: (3, 3),
            strides: (2, 2),
            padding: Padding::Same,
        }
    }
}

impl MaxPool2d {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn filter_size(mut self, filter_size: (usize, usize)) -> Self {
        self.filter_size = filter_size;
        self
    }
    pub fn strides(mut self, strides: (usize, usize)) -> Self {
        self.strides = strides;
        self
    }
    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }
}

impl Layer for MaxPool2d {
    fn kind(&self) -> &'static str {
        "MaxPool2d"
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn build(&mut self, input_shapes: &[Shape]) -> Result<()> {
        self.output_shape(input_shapes).map(|_| ())
    }
    fn is_built(&self) -> bool {
        true
    }

    fn output_shape(&self, input_shapes: &[Shape]) -> Result<Shape> {
        let shape = single_input("MaxPool2d", input_shapes)?;
        windowed_shape(
            "MaxPool2d",
            shape,
            self.filter_size,
            self.strides,
            self.padding,
            None,
        )
    }

    fn forward(&self, inputs: &[Tensor], _training: bool) -> Result<Tensor> {
        let x = single_tensor("MaxPool2d", inputs)?;
        let shape = x.borrow().shape.clone();
        let &[_, h, w, _] = shape.as_slice() else {
            return Err(GraphError::ShapeMismatch {
                context: "MaxPool2d input".into(),
                expected: vec![None; 4],
                actual: shape.iter().map(|&d| Some(d)).collect(),
            });
        };
        let window = Window2d::new((h, w), self.filter_size, self.strides, self.padding)?;
        Ok(RawTensor::max_pool2d(x, window))
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::MaxPool2d {
            filter_size: self.filter_size,
            strides: self.strides,
            padding: self.padding,
        }
    }
}
