use crate::error::{GraphError, Result};
use crate::nn::{Layer, LayerConfig, Shape, single_input, single_tensor};
use crate::tensor::{Tensor, TensorOps};

/// Flattens everything but the batch dimension.
///
/// Input shape: (B, D1, D2, ...)
/// Output shape: (B, D1 * D2 * ...)
#[derive(Default)]
pub struct Flatten {
    name: Option<String>,
}

impl Flatten {
    pub fn new() -> Self {
        Flatten::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Layer for Flatten {
    fn kind(&self) -> &'static str {
        "Flatten"
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
        let shape = single_input("Flatten", input_shapes)?;
        let Some((batch, rest)) = shape.split_first() else {
            return Err(GraphError::Graph("Flatten needs a batch dimension".into()));
        };
        let features = rest
            .iter()
            .try_fold(1usize, |acc, d| d.map(|d| acc * d));
        Ok(vec![*batch, features])
    }

    fn forward(&self, inputs: &[Tensor], _training: bool) -> Result<Tensor> {
        let x = single_tensor("Flatten", inputs)?;
        let shape = x.borrow().shape.clone();
        if shape.len() < 2 {
            return Ok(x.clone());
        }
        let flattened: usize = shape[1..].iter().product();
        Ok(x.reshape(&[shape[0], flattened]))
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Flatten
    }
}
