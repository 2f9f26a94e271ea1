use crate::error::{GraphError, Result};
use crate::model::{Graph, Model};
use crate::nn::{Layer, LayerConfig, Shape, shapes_compatible};
use crate::tensor::Tensor;

/// A static model used as a single layer of another graph.
///
/// Calling the handle several times shares the inner weights, which is
/// how siamese towers are built.
pub struct ModelLayer {
    name: Option<String>,
    model_name: String,
    graph: Graph,
}

impl ModelLayer {
    /// # Errors
    /// `NoStaticGraph` for dynamic models; multi-output models are rejected
    pub fn new(model: Model) -> Result<Self> {
        let (model_name, graph) = model.into_graph()?;
        if graph.output_shapes().len() != 1 {
            return Err(GraphError::Graph(format!(
                "model '{model_name}' has {} outputs; only single-output models can be layers",
                graph.output_shapes().len()
            )));
        }
        Ok(ModelLayer {
            name: Some(model_name.clone()),
            model_name,
            graph,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl Layer for ModelLayer {
    fn kind(&self) -> &'static str {
        "ModelLayer"
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn build(&mut self, input_shapes: &[Shape]) -> Result<()> {
        let expected = self.graph.input_shapes();
        if expected.len() != input_shapes.len() {
            return Err(GraphError::Graph(format!(
                "model '{}' takes {} inputs, got {}",
                self.model_name,
                expected.len(),
                input_shapes.len()
            )));
        }
        for (want, got) in expected.iter().zip(input_shapes) {
            if !shapes_compatible(want, got) {
                return Err(GraphError::ShapeMismatch {
                    context: format!("input of model '{}'", self.model_name),
                    expected: want.clone(),
                    actual: got.clone(),
                });
            }
        }
        Ok(())
    }
    fn is_built(&self) -> bool {
        true
    }

    fn output_shape(&self, _input_shapes: &[Shape]) -> Result<Shape> {
        self.graph
            .output_shapes()
            .pop()
            .ok_or_else(|| GraphError::Graph("model has no outputs".into()))
    }

    fn forward(&self, inputs: &[Tensor], training: bool) -> Result<Tensor> {
        self.graph
            .run(inputs, training)?
            .pop()
            .ok_or_else(|| GraphError::Graph("model produced no output".into()))
    }

    fn parameters(&self) -> Vec<(String, Tensor)> {
        self.graph.named_weights()
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::ModelLayer {
            model: Box::new(self.graph.config(&self.model_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{CallLayer, Dense, input};
    use crate::tensor::{RawTensor, TensorOps};

    fn tower() -> Model {
        let x = input(vec![None, Some(6)]).unwrap();
        let y = Dense::new(4).call(&x).unwrap();
        Model::new("tower", x, y).unwrap()
    }

    #[test]
    fn nested_model_shares_weights_across_calls() {
        let tower = tower().as_layer().unwrap().shared();
        let a = input(vec![None, Some(6)]).unwrap();
        let b = input(vec![None, Some(6)]).unwrap();
        let ya = tower.call_one(&a).unwrap();
        let yb = tower.call_one(&b).unwrap();
        let outer = Model::new("siamese", vec![a, b], vec![ya, yb]).unwrap();

        assert_eq!(outer.weights().len(), 2);
        let keys: Vec<_> = outer.state_dict().keys().cloned().collect();
        assert_eq!(keys, vec!["tower/dense_1/biases", "tower/dense_1/weights"]);

        let x = RawTensor::randn(&[2, 6]);
        let outs = outer.forward(&[x.clone(), x]).unwrap();
        assert_eq!(outs[0].to_vec(), outs[1].to_vec());
    }

    #[test]
    fn rejects_mismatched_input() {
        let tower = tower().as_layer().unwrap();
        let x = input(vec![None, Some(5)]).unwrap();
        assert!(tower.call(&x).is_err());
    }
}
