use crate::error::{GraphError, Result};
use crate::nn::activation::apply_opt;
use crate::nn::{Activation, Initializer, Layer, LayerConfig, Shape, single_input, single_tensor};
use crate::tensor::{Tensor, TensorOps};

/// Fully-connected layer
///
/// Computes: y = act(xW + b)
/// where x is (batch, in_channels), W is (in_channels, n_units), b is (n_units)
pub struct Dense {
    name: Option<String>,
    n_units: usize,
    act: Option<Activation>,
    w_init: Initializer,
    b_init: Option<Initializer>,
    in_channels: Option<usize>,
    weights: Option<Tensor>,
    biases: Option<Tensor>,
}

impl Dense {
    pub fn new(n_units: usize) -> Self {
        Dense {
            name: None,
            n_units,
            act: None,
            w_init: Initializer::truncated_normal(0.1),
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
    /// Fix the input width and allocate weights now
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
        self.weights = Some(self.w_init.init(&[in_channels, self.n_units]));
        self.biases = self.b_init.map(|init| init.init(&[self.n_units]));
    }

    pub fn n_units(&self) -> usize {
        self.n_units
    }
}

impl Layer for Dense {
    fn kind(&self) -> &'static str {
        "Dense"
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn build(&mut self, input_shapes: &[Shape]) -> Result<()> {
        let shape = single_input("Dense", input_shapes)?;
        let width = match shape.as_slice() {
            [_, Some(width)] => *width,
            _ => {
                return Err(GraphError::Graph(format!(
                    "Dense expects [batch, features] with known features, got {shape:?}"
                )));
            }
        };
        match self.in_channels {
            Some(expected) if expected != width => Err(GraphError::ShapeMismatch {
                context: format!("{} input width", self.name.as_deref().unwrap_or("Dense")),
                expected: vec![None, Some(expected)],
                actual: shape.clone(),
            }),
            Some(_) if self.weights.is_some() => Ok(()),
            _ => {
                self.in_channels = Some(width);
                self.allocate(width);
                Ok(())
            }
        }
    }
    fn is_built(&self) -> bool {
        self.weights.is_some()
    }

    fn output_shape(&self, input_shapes: &[Shape]) -> Result<Shape> {
        let shape = single_input("Dense", input_shapes)?;
        match shape.as_slice() {
            [batch, _] => Ok(vec![*batch, Some(self.n_units)]),
            _ => Err(GraphError::Graph(format!(
                "Dense expects a rank-2 input, got {shape:?}"
            ))),
        }
    }

    fn forward(&self, inputs: &[Tensor], _training: bool) -> Result<Tensor> {
        let x = single_tensor("Dense", inputs)?;
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| GraphError::NotBuilt(self.name.clone().unwrap_or_default()))?;
        let x_shape = x.borrow().shape.clone();
        if x_shape.len() != 2 || Some(x_shape[1]) != self.in_channels {
            return Err(GraphError::ShapeMismatch {
                context: "Dense input".into(),
                expected: vec![None, self.in_channels],
                actual: x_shape.iter().map(|&d| Some(d)).collect(),
            });
        }
        let mut out = x.matmul(weights);
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
        LayerConfig::Dense {
            n_units: self.n_units,
            act: self.act,
            w_init: self.w_init,
            b_init: self.b_init,
            in_channels: self.in_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::RawTensor;

    #[test]
    fn affine_forward() {
        let dense = Dense::new(2)
            .w_init(Initializer::Ones)
            .b_init(Some(Initializer::constant(0.5)))
            .in_channels(3);
        let x = RawTensor::new(vec![1.0, 2.0, 3.0], &[1, 3], false);
        let y = dense.forward(&[x], false).unwrap();
        assert_eq!(y.to_vec(), vec![6.5, 6.5]);
    }

    #[test]
    fn weight_gradient_matches_numerical() {
        let dense = Dense::new(3).act(Activation::Sigmoid).in_channels(4);
        let x = RawTensor::new((0..8).map(|i| i as f32 * 0.1).collect(), &[2, 4], true);
        assert!(RawTensor::check_gradients_simple(&x, |t| {
            dense.forward(&[t.clone()], false).unwrap().sum()
        }));
    }

    #[test]
    fn rejects_rank_four_input() {
        let mut dense = Dense::new(3);
        assert!(dense.build(&[vec![None, Some(2), Some(2), Some(1)]]).is_err());
    }
}
