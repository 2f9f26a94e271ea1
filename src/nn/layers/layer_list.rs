use crate::error::Result;
use crate::nn::config::NamedLayerConfig;
use crate::nn::{Layer, LayerConfig, Shape, kind_prefix, single_input, single_tensor};
use crate::tensor::Tensor;
use std::collections::HashSet;

/// Ordered sublayers applied one after another.
///
/// Unnamed sublayers are named `{kind}_{n}` on construction, so parameter
/// keys (`sublayer/param`) stay stable across save and load.
pub struct LayerList {
    name: Option<String>,
    layers: Vec<Box<dyn Layer>>,
    built: bool,
}

impl Default for LayerList {
    fn default() -> Self {
        Self {
            name: None,
            layers: Vec::new(),
            built: false,
        }
    }
}

impl LayerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boxed(layers: Vec<Box<dyn Layer>>) -> Self {
        layers.into_iter().fold(Self::new(), LayerList::push_boxed)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a layer
    pub fn push<L: Layer + 'static>(self, layer: L) -> Self {
        self.push_boxed(Box::new(layer))
    }

    pub fn push_boxed(mut self, mut layer: Box<dyn Layer>) -> Self {
        if layer.name().is_none() {
            let prefix = kind_prefix(layer.kind());
            let taken: HashSet<&str> = self.layers.iter().filter_map(|l| l.name()).collect();
            let name = (1..)
                .map(|n| format!("{prefix}_{n}"))
                .find(|n| !taken.contains(n.as_str()))
                .unwrap_or(prefix);
            layer.set_name(name);
        }
        self.built = false;
        self.layers.push(layer);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    /// Shape after each sublayer, in order
    pub fn trace_shapes(&self, input: &Shape) -> Result<Vec<Shape>> {
        let mut shape = input.clone();
        let mut shapes = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            shape = layer.output_shape(std::slice::from_ref(&shape))?;
            shapes.push(shape.clone());
        }
        Ok(shapes)
    }
}

impl Layer for LayerList {
    fn kind(&self) -> &'static str {
        "LayerList"
    }
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    fn build(&mut self, input_shapes: &[Shape]) -> Result<()> {
        let mut shape = single_input("LayerList", input_shapes)?.clone();
        for layer in &mut self.layers {
            let shapes = std::slice::from_ref(&shape);
            layer.build(shapes)?;
            shape = layer.output_shape(shapes)?;
        }
        self.built = true;
        Ok(())
    }
    fn is_built(&self) -> bool {
        self.built || self.layers.iter().all(|l| l.is_built())
    }

    fn output_shape(&self, input_shapes: &[Shape]) -> Result<Shape> {
        let input = single_input("LayerList", input_shapes)?;
        Ok(self
            .trace_shapes(input)?
            .pop()
            .unwrap_or_else(|| input.clone()))
    }

    fn forward(&self, inputs: &[Tensor], training: bool) -> Result<Tensor> {
        let mut current = single_tensor("LayerList", inputs)?.clone();
        for layer in &self.layers {
            current = layer.forward(std::slice::from_ref(&current), training)?;
        }
        Ok(current)
    }

    fn parameters(&self) -> Vec<(String, Tensor)> {
        self.layers
            .iter()
            .flat_map(|layer| {
                let prefix = layer.name().unwrap_or_default().to_string();
                layer
                    .parameters()
                    .into_iter()
                    .map(move |(key, t)| (format!("{prefix}/{key}"), t))
            })
            .collect()
    }

    fn config(&self) -> LayerConfig {
        LayerConfig::LayerList {
            layers: self
                .layers
                .iter()
                .map(|layer| NamedLayerConfig {
                    name: layer.name().unwrap_or_default().to_string(),
                    layer: layer.config(),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for LayerList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|l| l.name().unwrap_or(l.kind())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, Conv2d, Dense, Flatten, MaxPool2d};
    use crate::tensor::{RawTensor, TensorOps};

    fn small_stack() -> LayerList {
        LayerList::new()
            .push(Conv2d::new(4).act(Activation::Relu).with_name("conv1"))
            .push(MaxPool2d::new())
            .push(Flatten::new())
            .push(Dense::new(3))
    }

    #[test]
    fn unnamed_sublayers_get_kind_names() {
        let list = small_stack();
        let names: Vec<_> = list.layers().iter().map(|l| l.name().unwrap()).collect();
        assert_eq!(names, vec!["conv1", "maxpool2d_1", "flatten_1", "dense_1"]);
    }

    #[test]
    fn build_chains_shapes_and_runs() {
        let mut list = small_stack();
        let input = vec![None, Some(8), Some(8), Some(2)];
        list.build(std::slice::from_ref(&input)).unwrap();
        assert_eq!(list.output_shape(&[input]).unwrap(), vec![None, Some(3)]);

        let y = list.forward(&[RawTensor::randn(&[5, 8, 8, 2])], false).unwrap();
        assert_eq!(y.shape(), vec![5, 3]);

        let keys: Vec<_> = list.parameters().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec!["conv1/weights", "conv1/biases", "dense_1/weights", "dense_1/biases"]
        );
    }

    #[test]
    fn config_round_trip_through_instantiate() {
        let mut list = small_stack();
        list.build(&[vec![None, Some(8), Some(8), Some(2)]]).unwrap();
        let cfg = list.config();
        let rebuilt = cfg.instantiate("features").unwrap();
        assert_eq!(rebuilt.config(), cfg);
        assert!(rebuilt.is_built());
    }

    #[test]
    fn state_dict_loads_into_twin() {
        let mut a = small_stack();
        let mut b = small_stack();
        let input = vec![None, Some(8), Some(8), Some(2)];
        a.build(std::slice::from_ref(&input)).unwrap();
        b.build(std::slice::from_ref(&input)).unwrap();
        b.load_state_dict(&a.state_dict()).unwrap();
        let x = RawTensor::randn(&[1, 8, 8, 2]);
        let ya = a.forward(&[x.clone()], false).unwrap().to_vec();
        let yb = b.forward(&[x], false).unwrap().to_vec();
        assert_eq!(ya, yb);
    }
}
