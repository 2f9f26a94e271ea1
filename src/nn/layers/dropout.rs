use crate::error::{GraphError, Result};
use crate::nn::{Layer, LayerConfig, Shape, single_input, single_tensor};
use crate::tensor::{RawTensor, Tensor, TensorOps};
use rand::Rng;

/// Inverted dropout: in training mode each element is kept with
/// probability `keep` and scaled by `1 / keep`; identity in eval mode.
pub struct Dropout {
    name: Option<String>,
    keep: f32,
}

impl Dropout {
    /// # Errors
    /// `keep` outside (0, 1]
    pub fn new(keep: f32) -> Result<Self> {
        if !(keep > 0.0 && keep <= 1.0) {
            return Err(GraphError::InvalidParameter(format!(
                "dropout keep probability must be in (0, 1], got {keep}"
            )));
        }
        Ok(Self { name: None, keep })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn keep(&self) -> f32 {
        self.keep
    }
}

impl Layer for Dropout {
    fn kind(&self) -> &'static str {
        "Dropout"
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn build(&mut self, input_shapes: &[Shape]) -> Result<()> {
        single_input("Dropout", input_shapes).map(|_| ())
    }
    fn is_built(&self) -> bool {
        true
    }

    fn output_shape(&self, input_shapes: &[Shape]) -> Result<Shape> {
        single_input("Dropout", input_shapes).cloned()
    }

    fn forward(&self, inputs: &[Tensor], training: bool) -> Result<Tensor> {
        let x = single_tensor("Dropout", inputs)?;
        if !training || self.keep >= 1.0 {
            return Ok(x.clone());
        }

        let scale = 1.0 / self.keep;
        let shape = x.borrow().shape.clone();
        let size: usize = shape.iter().product();
        let mut rng = rand::rng();
        let mask_data: Vec<f32> = (0..size)
            .map(|_| {
                if rng.random::<f32>() < self.keep {
                    scale
                } else {
                    0.0
                }
            })
            .collect();

        let mask = RawTensor::new(mask_data, &shape, false);
        Ok(x.elem_mul(&mask))
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::Dropout { keep: self.keep }
    }
}
