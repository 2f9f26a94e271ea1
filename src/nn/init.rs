use crate::tensor::{RawTensor, Tensor};
use serde::{Deserialize, Serialize};

/// Parameter initializer, recorded in layer configs so a structure-only
/// reload can draw fresh weights the same way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Initializer {
    Zeros,
    Ones,
    Constant { value: f32 },
    RandomNormal { mean: f32, stddev: f32 },
    TruncatedNormal { mean: f32, stddev: f32 },
    XavierUniform,
}

impl Initializer {
    pub fn truncated_normal(stddev: f32) -> Self {
        Initializer::TruncatedNormal { mean: 0.0, stddev }
    }

    pub fn constant(value: f32) -> Self {
        Initializer::Constant { value }
    }

    /// Fresh trainable tensor of `shape`
    pub fn init(&self, shape: &[usize]) -> Tensor {
        let t = match *self {
            Initializer::Zeros => RawTensor::zeros(shape),
            Initializer::Ones => RawTensor::ones(shape),
            Initializer::Constant { value } => RawTensor::constant(value, shape),
            Initializer::RandomNormal { mean, stddev } => {
                RawTensor::random_normal(shape, mean, stddev)
            }
            Initializer::TruncatedNormal { mean, stddev } => {
                RawTensor::truncated_normal(shape, mean, stddev)
            }
            Initializer::XavierUniform => RawTensor::xavier_uniform(shape),
        };
        t.borrow_mut().requires_grad = true;
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_marks_trainable() {
        let t = Initializer::constant(0.5).init(&[2, 2]);
        assert!(t.borrow().requires_grad);
        assert_eq!(t.borrow().data, vec![0.5; 4]);
    }

    #[test]
    fn tagged_json() {
        let json = serde_json::to_string(&Initializer::truncated_normal(0.02)).unwrap();
        assert_eq!(json, r#"{"type":"truncated_normal","mean":0.0,"stddev":0.02}"#);
    }
}
