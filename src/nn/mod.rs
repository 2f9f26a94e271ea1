use crate::error::{GraphError, Result};
use crate::io::{StateDict, TensorData};
use crate::tensor::Tensor;

pub mod activation;
pub mod config;
pub mod graph;
pub mod init;
pub mod layers;
pub mod optim;

pub use activation::Activation;
pub use config::{LayerConfig, NamedLayerConfig};
pub use graph::{CallLayer, LayerHandle, Node, input};
pub use init::Initializer;
pub use layers::{
    Concat, Conv2d, Dense, Dropout, Flatten, Input, LayerList, MaxPool2d, ModelLayer,
};
pub use optim::{Adam, Optimizer, SGD};

/// Symbolic shape: `None` marks a dimension only known at run time
pub type Shape = Vec<Option<usize>>;

/// A graph node type: shape inference, parameters, forward pass and a
/// serializable description of its constructor arguments.
///
/// Layers are usually driven through a [`LayerHandle`], which owns them
/// behind `Rc<RefCell<_>>` so one layer can be called on several nodes.
pub trait Layer {
    /// Class name recorded in configs, e.g. `"Dense"`
    fn kind(&self) -> &'static str;
    fn name(&self) -> Option<&str>;
    fn set_name(&mut self, name: String);

    /// Allocate parameters for the given input shapes.
    ///
    /// Called on every graph call; a built layer only checks that the
    /// shapes agree with what it was built for.
    fn build(&mut self, input_shapes: &[Shape]) -> Result<()>;
    fn is_built(&self) -> bool;

    /// Pure shape inference
    fn output_shape(&self, input_shapes: &[Shape]) -> Result<Shape>;

    fn forward(&self, inputs: &[Tensor], training: bool) -> Result<Tensor>;

    /// Trainable tensors keyed by their local name (`weights`, `biases`,
    /// or `sublayer/param` for containers)
    fn parameters(&self) -> Vec<(String, Tensor)> {
        Vec::new()
    }

    fn config(&self) -> LayerConfig;

    fn state_dict(&self) -> StateDict {
        self.parameters()
            .into_iter()
            .map(|(key, t)| (key, TensorData::from_tensor(&t)))
            .collect()
    }

    /// Copy values from `state` into the existing parameter tensors.
    ///
    /// Parameters are shared `Rc`s, so this writes through `&self`.
    fn load_state_dict(&self, state: &StateDict) -> Result<()> {
        for (key, param) in self.parameters() {
            let td = state
                .get(&key)
                .ok_or_else(|| GraphError::StateDict(format!("missing key '{key}'")))?;
            let mut p = param.borrow_mut();
            if p.shape != td.shape || !td.is_consistent() {
                return Err(GraphError::StateDict(format!(
                    "shape mismatch for '{key}': expected {:?}, got {:?} with {} values",
                    p.shape,
                    td.shape,
                    td.data.len()
                )));
            }
            p.data.clone_from(&td.data);
            p.grad = None;
        }
        Ok(())
    }

    fn zero_grad(&self) {
        for (_, p) in self.parameters() {
            p.borrow_mut().grad = None;
        }
    }
}

/// Name prefix used for auto-naming, e.g. `Conv2d` -> `conv2d`
pub fn kind_prefix(kind: &str) -> String {
    kind.to_ascii_lowercase()
}

/// The one input shape of a single-input layer
pub(crate) fn single_input<'a>(kind: &str, shapes: &'a [Shape]) -> Result<&'a Shape> {
    match shapes {
        [shape] => Ok(shape),
        _ => Err(GraphError::Graph(format!(
            "{kind} expects exactly one input, got {}",
            shapes.len()
        ))),
    }
}

/// The one input tensor of a single-input layer
pub(crate) fn single_tensor<'a>(kind: &str, inputs: &'a [Tensor]) -> Result<&'a Tensor> {
    match inputs {
        [t] => Ok(t),
        _ => Err(GraphError::Graph(format!(
            "{kind} expects exactly one input tensor, got {}",
            inputs.len()
        ))),
    }
}

/// Check a symbolic shape against another, treating `None` as a wildcard
pub fn shapes_compatible(expected: &[Option<usize>], actual: &[Option<usize>]) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(e, a)| e.is_none() || a.is_none() || e == a)
}

/// Check a concrete tensor shape against a symbolic one
pub fn check_concrete(context: &str, expected: &[Option<usize>], actual: &[usize]) -> Result<()> {
    let actual_sym: Shape = actual.iter().map(|&d| Some(d)).collect();
    if shapes_compatible(expected, &actual_sym) {
        Ok(())
    } else {
        Err(GraphError::ShapeMismatch {
            context: context.to_string(),
            expected: expected.to_vec(),
            actual: actual_sym,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_dimensions_match_anything() {
        assert!(shapes_compatible(&[None, Some(3)], &[Some(8), Some(3)]));
        assert!(!shapes_compatible(&[None, Some(3)], &[Some(8), Some(4)]));
        assert!(!shapes_compatible(&[None], &[None, None]));
    }

    #[test]
    fn concrete_check_reports_shapes() {
        let err = check_concrete("input", &[None, Some(4)], &[2, 5]).unwrap_err();
        assert!(matches!(err, GraphError::ShapeMismatch { .. }));
        assert!(check_concrete("input", &[None, Some(4)], &[2, 4]).is_ok());
    }
}
