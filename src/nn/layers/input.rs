use crate::error::{GraphError, Result};
use crate::nn::{Layer, LayerConfig, Shape, check_concrete, single_tensor};
use crate::tensor::Tensor;

/// Graph entry point: a placeholder with a (partially) known shape
pub struct Input {
    name: Option<String>,
    shape: Shape,
}

impl Input {
    /// `shape` usually leads with `None` for the batch dimension
    pub fn new(shape: impl Into<Shape>) -> Self {
        Input {
            name: None,
            shape: shape.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }
}

impl Layer for Input {
    fn kind(&self) -> &'static str {
        "Input"
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn build(&mut self, input_shapes: &[Shape]) -> Result<()> {
        if input_shapes.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Graph("Input layers take no inbound nodes".into()))
        }
    }
    fn is_built(&self) -> bool {
        true
    }

    fn output_shape(&self, _input_shapes: &[Shape]) -> Result<Shape> {
        Ok(self.shape.clone())
    }

    fn forward(&self, inputs: &[Tensor], _training: bool) -> Result<Tensor> {
        let x = single_tensor("Input", inputs)?;
        check_concrete("Input", &self.shape, &x.borrow().shape)?;
        Ok(x.clone())
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Input {
            shape: self.shape.clone(),
        }
    }
}
