use crate::tensor::{Tensor, TensorOps};
use serde::{Deserialize, Serialize};

/// Elementwise nonlinearity applied at the end of a layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    LeakyRelu { alpha: f32 },
    Sigmoid,
    Tanh,
}

impl Activation {
    pub fn apply(&self, x: &Tensor) -> Tensor {
        match *self {
            Activation::Relu => x.relu(),
            Activation::LeakyRelu { alpha } => x.leaky_relu(alpha),
            Activation::Sigmoid => x.sigmoid(),
            Activation::Tanh => x.tanh(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::LeakyRelu { .. } => "leaky_relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
        }
    }
}

/// Apply an optional activation; `None` is identity
pub(crate) fn apply_opt(act: Option<Activation>, x: Tensor) -> Tensor {
    match act {
        Some(a) => a.apply(&x),
        None => x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::RawTensor;

    #[test]
    fn relu_and_leaky() {
        let x = RawTensor::new(vec![-2.0, 0.5], &[2], false);
        assert_eq!(Activation::Relu.apply(&x).to_vec(), vec![0.0, 0.5]);
        let y = Activation::LeakyRelu { alpha: 0.1 }.apply(&x).to_vec();
        assert!((y[0] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&Activation::Relu).unwrap();
        assert_eq!(json, "\"relu\"");
        let leaky: Activation = serde_json::from_str(r#"{"leaky_relu":{"alpha":0.2}}"#).unwrap();
        assert_eq!(leaky, Activation::LeakyRelu { alpha: 0.2 });
    }
}
