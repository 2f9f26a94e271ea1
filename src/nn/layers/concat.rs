use crate::error::{GraphError, Result};
use crate::nn::{Layer, LayerConfig, Shape};
use crate::tensor::{RawTensor, Tensor};

/// Joins its inputs along `concat_dim`; negative values count from the end
pub struct Concat {
    name: Option<String>,
    concat_dim: isize,
}

impl Default for Concat {
    fn default() -> Self {
        Self::new(-1)
    }
}

impl Concat {
    pub fn new(concat_dim: isize) -> Self {
        Concat {
            name: None,
            concat_dim,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn axis(&self, rank: usize) -> Result<usize> {
        let axis = if self.concat_dim < 0 {
            rank as isize + self.concat_dim
        } else {
            self.concat_dim
        };
        usize::try_from(axis)
            .ok()
            .filter(|&a| a < rank)
            .ok_or_else(|| {
                GraphError::InvalidParameter(format!(
                    "concat_dim {} out of range for rank {rank}",
                    self.concat_dim
                ))
            })
    }
}

impl Layer for Concat {
    fn kind(&self) -> &'static str {
        "Concat"
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
        let Some(first) = input_shapes.first() else {
            return Err(GraphError::Graph("Concat needs at least one input".into()));
        };
        let axis = self.axis(first.len())?;
        let mut out = first.clone();
        for shape in &input_shapes[1..] {
            let mismatch = shape.len() != first.len()
                || shape.iter().zip(first).enumerate().any(|(d, (a, b))| {
                    d != axis && a.is_some() && b.is_some() && a != b
                });
            if mismatch {
                return Err(GraphError::ShapeMismatch {
                    context: "Concat inputs".into(),
                    expected: first.clone(),
                    actual: shape.clone(),
                });
            }
            out[axis] = out[axis].zip(shape[axis]).map(|(a, b)| a + b);
        }
        Ok(out)
    }

    fn forward(&self, inputs: &[Tensor], _training: bool) -> Result<Tensor> {
        let Some(first) = inputs.first() else {
            return Err(GraphError::Graph("Concat needs at least one input".into()));
        };
        let rank = first.borrow().shape.len();
        let axis = self.axis(rank)?;
        let shapes: Vec<Shape> = inputs
            .iter()
            .map(|t| t.borrow().shape.iter().map(|&d| Some(d)).collect())
            .collect();
        self.output_shape(&shapes)?;
        Ok(RawTensor::concat(inputs, axis))
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Concat {
            concat_dim: self.concat_dim,
        }
    }
}
