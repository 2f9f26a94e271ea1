use crate::error::{GraphError, Result};
use crate::io::config::{LayerEntry, ModelConfig, NodeRef, NodeRefs};
use crate::io::{ModelFile, StateDict, TensorData, diff_state_dict};
use crate::nn::layers::ModelLayer;
use crate::nn::{Layer, LayerHandle, Node, check_concrete, kind_prefix};
use crate::tensor::Tensor;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Model inputs or outputs: one node or an ordered list of nodes
#[derive(Clone, Debug)]
pub struct NodeList {
    nodes: Vec<Node>,
    is_list: bool,
}

impl NodeList {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
    pub fn is_list(&self) -> bool {
        self.is_list
    }
}

impl From<Node> for NodeList {
    fn from(node: Node) -> Self {
        NodeList {
            nodes: vec![node],
            is_list: false,
        }
    }
}

impl From<&Node> for NodeList {
    fn from(node: &Node) -> Self {
        node.clone().into()
    }
}

impl From<Vec<Node>> for NodeList {
    fn from(nodes: Vec<Node>) -> Self {
        NodeList {
            nodes,
            is_list: true,
        }
    }
}

impl<const N: usize> From<[Node; N]> for NodeList {
    fn from(nodes: [Node; N]) -> Self {
        Vec::from(nodes).into()
    }
}

/// User-defined forward pass over pre-built layers (dynamic mode)
///
/// Layers returned by `layers` are the ones whose parameters the model
/// trains and saves; unnamed ones are keyed `{kind}_{position}`.
pub trait Network {
    fn forward(&self, x: &Tensor, training: bool) -> Result<Tensor>;
    fn layers(&self) -> Vec<&dyn Layer>;
}

/// Static computation graph resolved from output nodes back to inputs
pub(crate) struct Graph {
    inputs: NodeList,
    outputs: NodeList,
    /// All reachable nodes, inputs before consumers
    nodes: Vec<Node>,
    /// Layers in order of first use
    layers: Vec<LayerHandle>,
    /// Per layer, its nodes in this graph ordered by call index
    layer_nodes: Vec<Vec<Node>>,
}

fn visit(node: &Node, seen: &mut HashSet<usize>, order: &mut Vec<Node>) {
    if !seen.insert(node.id()) {
        return;
    }
    for input in node.inputs() {
        visit(input, seen, order);
    }
    order.push(node.clone());
}

impl Graph {
    fn resolve(inputs: NodeList, outputs: NodeList) -> Result<Self> {
        if outputs.nodes.is_empty() {
            return Err(GraphError::Graph("a model needs at least one output".into()));
        }
        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        for out in &outputs.nodes {
            visit(out, &mut seen, &mut nodes);
        }

        let declared: HashSet<usize> = inputs.nodes.iter().map(Node::id).collect();
        for input in &inputs.nodes {
            if !input.is_source() {
                return Err(GraphError::Graph(format!(
                    "model input from layer '{}' is not an Input node",
                    input.layer().name().unwrap_or_default()
                )));
            }
            if !seen.contains(&input.id()) {
                return Err(GraphError::Graph(format!(
                    "input '{}' is not connected to any output",
                    input.layer().name().unwrap_or_default()
                )));
            }
        }
        if let Some(stray) = nodes
            .iter()
            .find(|n| n.is_source() && !declared.contains(&n.id()))
        {
            return Err(GraphError::Graph(format!(
                "outputs depend on an undeclared input of shape {:?}",
                stray.shape()
            )));
        }

        let mut layers: Vec<LayerHandle> = Vec::new();
        let mut layer_nodes: Vec<Vec<Node>> = Vec::new();
        let mut slot: HashMap<usize, usize> = HashMap::new();
        for node in &nodes {
            let handle = node.layer();
            let i = *slot.entry(handle.id()).or_insert_with(|| {
                layers.push(handle.clone());
                layer_nodes.push(Vec::new());
                layers.len() - 1
            });
            layer_nodes[i].push(node.clone());
        }
        for calls in &mut layer_nodes {
            calls.sort_by_key(Node::call_index);
        }

        let graph = Graph {
            inputs,
            outputs,
            nodes,
            layers,
            layer_nodes,
        };
        graph.assign_names()?;
        Ok(graph)
    }

    /// Name unnamed layers `{kind}_{n}` and reject duplicates
    fn assign_names(&self) -> Result<()> {
        let mut taken: HashSet<String> = self.layers.iter().filter_map(LayerHandle::name).collect();
        let mut counters: HashMap<String, usize> = HashMap::new();
        for handle in &self.layers {
            if handle.name().is_some() {
                continue;
            }
            let prefix = kind_prefix(handle.kind());
            let counter = counters.entry(prefix.clone()).or_insert(0);
            let name = loop {
                *counter += 1;
                let candidate = format!("{prefix}_{counter}");
                if !taken.contains(&candidate) {
                    break candidate;
                }
            };
            taken.insert(name.clone());
            handle.borrow_mut().set_name(name);
        }

        let mut owners: HashMap<String, usize> = HashMap::new();
        for handle in &self.layers {
            let name = handle.name().unwrap_or_default();
            if let Some(&owner) = owners.get(&name)
                && owner != handle.id()
            {
                return Err(GraphError::DuplicateLayerName(name));
            }
            owners.insert(name, handle.id());
        }
        Ok(())
    }

    pub(crate) fn input_shapes(&self) -> Vec<crate::nn::Shape> {
        self.inputs.nodes.iter().map(|n| n.shape().clone()).collect()
    }

    pub(crate) fn output_shapes(&self) -> Vec<crate::nn::Shape> {
        self.outputs.nodes.iter().map(|n| n.shape().clone()).collect()
    }

    pub(crate) fn run(&self, inputs: &[Tensor], training: bool) -> Result<Vec<Tensor>> {
        if inputs.len() != self.inputs.nodes.len() {
            return Err(GraphError::Graph(format!(
                "model expects {} inputs, got {}",
                self.inputs.nodes.len(),
                inputs.len()
            )));
        }
        let mut values: HashMap<usize, Tensor> = HashMap::new();
        for (node, t) in self.inputs.nodes.iter().zip(inputs) {
            let name = node.layer().name().unwrap_or_default();
            check_concrete(&name, node.shape(), &t.borrow().shape)?;
            values.insert(node.id(), t.clone());
        }
        for node in &self.nodes {
            if node.is_source() {
                continue;
            }
            let args = node
                .inputs()
                .iter()
                .map(|i| {
                    values.get(&i.id()).cloned().ok_or_else(|| {
                        GraphError::Graph("node evaluated before its inputs".into())
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let out = node.layer().borrow().forward(&args, training)?;
            values.insert(node.id(), out);
        }
        self.outputs
            .nodes
            .iter()
            .map(|o| {
                values
                    .get(&o.id())
                    .cloned()
                    .ok_or_else(|| GraphError::Graph("output was never computed".into()))
            })
            .collect()
    }

    pub(crate) fn named_weights(&self) -> Vec<(String, Tensor)> {
        self.layers
            .iter()
            .flat_map(|handle| {
                let name = handle.name().unwrap_or_default();
                handle
                    .borrow()
                    .parameters()
                    .into_iter()
                    .map(move |(key, t)| (format!("{name}/{key}"), t))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub(crate) fn config(&self, model_name: &str) -> ModelConfig {
        let mut refs: HashMap<usize, NodeRef> = HashMap::new();
        for (handle, calls) in self.layers.iter().zip(&self.layer_nodes) {
            let layer = handle.name().unwrap_or_default();
            for (index, node) in calls.iter().enumerate() {
                refs.insert(
                    node.id(),
                    NodeRef {
                        layer: layer.clone(),
                        index,
                    },
                );
            }
        }
        let to_refs = |list: &NodeList| NodeRefs {
            nodes: list
                .nodes
                .iter()
                .filter_map(|n| refs.get(&n.id()).cloned())
                .collect(),
            is_list: list.is_list,
        };

        let layers = self
            .layers
            .iter()
            .zip(&self.layer_nodes)
            .map(|(handle, calls)| LayerEntry {
                name: handle.name().unwrap_or_default(),
                config: handle.borrow().config(),
                inbound: calls
                    .iter()
                    .map(|node| {
                        node.inputs()
                            .iter()
                            .filter_map(|i| refs.get(&i.id()).cloned())
                            .collect()
                    })
                    .collect(),
            })
            .collect();

        ModelConfig {
            name: model_name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            inputs: to_refs(&self.inputs),
            outputs: to_refs(&self.outputs),
            layers,
        }
    }

    /// Replay a config: instantiate every layer, then call layers on their
    /// recorded inbound nodes as soon as those nodes exist
    fn from_config(config: &ModelConfig) -> Result<Self> {
        let handles = config
            .layers
            .iter()
            .map(|entry| entry.config.instantiate(&entry.name).map(LayerHandle::from_box))
            .collect::<Result<Vec<_>>>()?;
        let position: HashMap<&str, usize> = config
            .layers
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.name.as_str(), i))
            .collect();

        let mut created: Vec<Vec<Node>> = vec![Vec::new(); handles.len()];
        let lookup = |created: &[Vec<Node>], r: &NodeRef| -> Result<Option<Node>> {
            let unknown = || GraphError::UnknownNode {
                layer: r.layer.clone(),
                index: r.index,
            };
            let &i = position.get(r.layer.as_str()).ok_or_else(unknown)?;
            if r.index >= config.layers[i].inbound.len() {
                return Err(unknown());
            }
            Ok(created[i].get(r.index).cloned())
        };

        loop {
            let mut advanced = false;
            for (i, entry) in config.layers.iter().enumerate() {
                while let Some(call) = entry.inbound.get(created[i].len()) {
                    let mut args = Vec::with_capacity(call.len());
                    for r in call {
                        match lookup(&created, r)? {
                            Some(node) => args.push(node),
                            None => break,
                        }
                    }
                    if args.len() < call.len() {
                        break;
                    }
                    let node = handles[i].call(&args)?;
                    created[i].push(node);
                    advanced = true;
                }
            }
            let done = config
                .layers
                .iter()
                .zip(&created)
                .all(|(entry, nodes)| nodes.len() == entry.inbound.len());
            if done {
                break;
            }
            if !advanced {
                return Err(GraphError::Graph(
                    "config contains a cycle or a dangling node reference".into(),
                ));
            }
        }

        let resolve = |refs: &NodeRefs| -> Result<NodeList> {
            let nodes = refs
                .nodes
                .iter()
                .map(|r| {
                    lookup(&created, r)?.ok_or_else(|| GraphError::UnknownNode {
                        layer: r.layer.clone(),
                        index: r.index,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(NodeList {
                nodes,
                is_list: refs.is_list,
            })
        };
        Graph::resolve(resolve(&config.inputs)?, resolve(&config.outputs)?)
    }
}

enum ModelKind {
    Static(Graph),
    Dynamic(Box<dyn Network>),
}

/// A trainable network in static (graph) or dynamic (imperative) mode
///
/// Static models keep their topology and can be saved structurally;
/// dynamic models only carry weights.
pub struct Model {
    name: String,
    kind: ModelKind,
    training: bool,
}

impl Model {
    /// Assemble a static model from symbolic inputs to outputs.
    ///
    /// # Errors
    /// An input not connected to the outputs, an output depending on an
    /// undeclared input, or two distinct layers sharing a name.
    pub fn new(
        name: impl Into<String>,
        inputs: impl Into<NodeList>,
        outputs: impl Into<NodeList>,
    ) -> Result<Self> {
        let graph = Graph::resolve(inputs.into(), outputs.into())?;
        let name = name.into();
        tracing::info!(
            model = %name,
            layers = graph.layers.len(),
            nodes = graph.nodes.len(),
            "assembled static model"
        );
        Ok(Model {
            name,
            kind: ModelKind::Static(graph),
            training: false,
        })
    }

    /// Wrap a user-defined forward pass
    ///
    /// # Errors
    /// `DuplicateLayerName` when two layers of `network` resolve to the
    /// same state-dict prefix
    pub fn dynamic(name: impl Into<String>, network: impl Network + 'static) -> Result<Self> {
        check_unique_names(&network)?;
        Ok(Model {
            name: name.into(),
            kind: ModelKind::Dynamic(Box::new(network)),
            training: false,
        })
    }

    /// Rebuild a static model from its topology; parameters are freshly
    /// drawn from the recorded initializers
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let graph = Graph::from_config(config)?;
        tracing::debug!(model = %config.name, layers = config.layers.len(), "rebuilt model from config");
        Ok(Model {
            name: config.name.clone(),
            kind: ModelKind::Static(graph),
            training: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_static(&self) -> bool {
        matches!(self.kind, ModelKind::Static(_))
    }

    pub fn train(&mut self) {
        self.training = true;
    }

    pub fn eval(&mut self) {
        self.training = false;
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    fn graph(&self, operation: &'static str) -> Result<&Graph> {
        match &self.kind {
            ModelKind::Static(graph) => Ok(graph),
            ModelKind::Dynamic(_) => Err(GraphError::NoStaticGraph { operation }),
        }
    }

    /// Structural description of a static model
    pub fn config(&self) -> Result<ModelConfig> {
        Ok(self.graph("config")?.config(&self.name))
    }

    /// Layers of a static model in order of first use
    pub fn layers(&self) -> Result<&[LayerHandle]> {
        Ok(&self.graph("layers")?.layers)
    }

    /// Look up a layer of a static model by name
    pub fn layer(&self, name: &str) -> Option<LayerHandle> {
        let ModelKind::Static(graph) = &self.kind else {
            return None;
        };
        graph
            .layers
            .iter()
            .find(|h| h.name().as_deref() == Some(name))
            .cloned()
    }

    /// Run the model on concrete tensors in the current train/eval mode
    pub fn forward(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        match &self.kind {
            ModelKind::Static(graph) => graph.run(inputs, self.training),
            ModelKind::Dynamic(network) => match inputs {
                [x] => Ok(vec![network.forward(x, self.training)?]),
                _ => Err(GraphError::Graph(format!(
                    "dynamic model takes one input, got {}",
                    inputs.len()
                ))),
            },
        }
    }

    /// Forward for single-input, single-output models
    pub fn forward_one(&self, x: &Tensor) -> Result<Tensor> {
        let mut outputs = self.forward(std::slice::from_ref(x))?;
        match outputs.len() {
            1 => Ok(outputs.remove(0)),
            n => Err(GraphError::Graph(format!(
                "forward_one needs a single-output model, this one has {n}"
            ))),
        }
    }

    /// Trainable tensors keyed `layer/param`, in deterministic order
    pub fn named_weights(&self) -> Vec<(String, Tensor)> {
        match &self.kind {
            ModelKind::Static(graph) => graph.named_weights(),
            ModelKind::Dynamic(network) => network
                .layers()
                .into_iter()
                .enumerate()
                .flat_map(|(i, layer)| {
                    let name = dynamic_layer_name(layer, i);
                    layer
                        .parameters()
                        .into_iter()
                        .map(move |(key, t)| (format!("{name}/{key}"), t))
                        .collect::<Vec<_>>()
                })
                .collect(),
        }
    }

    pub fn weights(&self) -> Vec<Tensor> {
        self.named_weights().into_iter().map(|(_, t)| t).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.weights().iter().map(|t| t.borrow().numel()).sum()
    }

    pub fn zero_grad(&self) {
        for t in self.weights() {
            t.borrow_mut().grad = None;
        }
    }

    pub fn state_dict(&self) -> StateDict {
        self.named_weights()
            .into_iter()
            .map(|(key, t)| (key, TensorData::from_tensor(&t)))
            .collect()
    }

    /// Copy weights in; keys and shapes must match exactly
    pub fn load_state_dict(&self, state: &StateDict) -> Result<()> {
        if let ModelKind::Dynamic(network) = &self.kind {
            check_unique_names(network.as_ref())?;
        }
        let weights = self.named_weights();
        let expected: StateDict = weights
            .iter()
            .map(|(key, t)| (key.clone(), TensorData::from_tensor(t)))
            .collect();
        let diff = diff_state_dict(&expected, state);
        if !diff.is_empty() {
            return Err(GraphError::StateDict(diff.to_string()));
        }
        for (key, t) in weights {
            if let Some(td) = state.get(&key) {
                let mut p = t.borrow_mut();
                p.data.clone_from(&td.data);
                p.grad = None;
            }
        }
        Ok(())
    }

    /// Save structure, and weights when `save_weights` is set
    ///
    /// # Errors
    /// `NoStaticGraph` for dynamic models, whatever `save_weights` says
    pub fn save(&self, path: impl AsRef<Path>, save_weights: bool) -> Result<()> {
        let config = self.graph("save")?.config(&self.name);
        let weights = save_weights.then(|| self.state_dict());
        ModelFile::new(Some(&config), weights)?.write(&path)?;
        tracing::info!(
            model = %self.name,
            path = %path.as_ref().display(),
            save_weights,
            "saved model"
        );
        Ok(())
    }

    /// Load a model saved with [`Model::save`]
    ///
    /// # Errors
    /// `MissingConfig` when the file holds no structure, `MissingWeights`
    /// when `load_weights` is set and the file holds none
    pub fn load(path: impl AsRef<Path>, load_weights: bool) -> Result<Self> {
        let path = path.as_ref();
        let mut file = ModelFile::read(path)?;
        let config = file.model_config(path)?;
        let weights = if load_weights {
            Some(file.take_weights(path)?)
        } else {
            None
        };
        let model = Model::from_config(&config)?;
        match weights {
            Some(state) => model.load_state_dict(&state)?,
            None => tracing::warn!(
                model = %model.name,
                "loaded structure only; parameters freshly initialized"
            ),
        }
        tracing::info!(model = %model.name, path = %path.display(), load_weights, "loaded model");
        Ok(model)
    }

    /// Save the state dict only; works in both modes
    pub fn save_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        ModelFile::new(None, Some(self.state_dict()))?.write(path)
    }

    pub fn load_weights(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let state = ModelFile::read(path)?.take_weights(path)?;
        self.load_state_dict(&state)
    }

    /// Turn a static model into a layer that can be called inside another graph
    pub fn as_layer(self) -> Result<ModelLayer> {
        ModelLayer::new(self)
    }

    pub(crate) fn into_graph(self) -> Result<(String, Graph)> {
        match self.kind {
            ModelKind::Static(graph) => Ok((self.name, graph)),
            ModelKind::Dynamic(_) => Err(GraphError::NoStaticGraph {
                operation: "as_layer",
            }),
        }
    }
}

/// State-dict prefix of the `position`-th layer of a dynamic network
fn dynamic_layer_name(layer: &dyn Layer, position: usize) -> String {
    layer
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_{}", kind_prefix(layer.kind()), position + 1))
}

fn check_unique_names(network: &dyn Network) -> Result<()> {
    let mut seen = HashSet::new();
    for (i, layer) in network.layers().into_iter().enumerate() {
        let name = dynamic_layer_name(layer, i);
        if !seen.insert(name.clone()) {
            return Err(GraphError::DuplicateLayerName(name));
        }
    }
    Ok(())
}

fn fmt_shape(shape: &[Option<usize>]) -> String {
    let dims: Vec<String> = shape
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |d| d.to_string()))
        .collect();
    format!("[{}]", dims.join(", "))
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.is_static() { "static" } else { "dynamic" };
        writeln!(f, "Model '{}' ({mode})", self.name)?;
        writeln!(f, "{:<24} {:<12} {:<24} {:>10}", "layer", "kind", "output", "params")?;
        match &self.kind {
            ModelKind::Static(graph) => {
                for (handle, calls) in graph.layers.iter().zip(&graph.layer_nodes) {
                    let layer = handle.borrow();
                    let params: usize = layer
                        .parameters()
                        .iter()
                        .map(|(_, t)| t.borrow().numel())
                        .sum();
                    let shape = calls.first().map(|n| fmt_shape(n.shape())).unwrap_or_default();
                    writeln!(
                        f,
                        "{:<24} {:<12} {:<24} {:>10}",
                        layer.name().unwrap_or_default(),
                        layer.kind(),
                        shape,
                        params
                    )?;
                }
            }
            ModelKind::Dynamic(network) => {
                for layer in network.layers() {
                    let params: usize = layer
                        .parameters()
                        .iter()
                        .map(|(_, t)| t.borrow().numel())
                        .sum();
                    writeln!(
                        f,
                        "{:<24} {:<12} {:<24} {:>10}",
                        layer.name().unwrap_or_default(),
                        layer.kind(),
                        "-",
                        params
                    )?;
                }
            }
        }
        write!(f, "total parameters: {}", self.num_parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, CallLayer, Concat, Dense, Dropout, input};
    use crate::tensor::{RawTensor, TensorOps};

    fn mlp() -> Model {
        let x = input(vec![None, Some(4)]).unwrap();
        let h = Dense::new(8).act(Activation::Relu).call(&x).unwrap();
        let h = Dropout::new(0.8).unwrap().call(&h).unwrap();
        let y = Dense::new(3).with_name("logits").call(&h).unwrap();
        Model::new("mlp", x, y).unwrap()
    }

    #[test]
    fn unnamed_layers_are_numbered_per_kind() {
        let model = mlp();
        let names: Vec<_> = model
            .layers()
            .unwrap()
            .iter()
            .map(|h| h.name().unwrap())
            .collect();
        assert_eq!(names, vec!["input_1", "dense_1", "dropout_1", "logits"]);
    }

    #[test]
    fn forward_shapes_and_modes() {
        let mut model = mlp();
        assert!(!model.is_training());
        let y = model.forward_one(&RawTensor::randn(&[5, 4])).unwrap();
        assert_eq!(y.shape(), vec![5, 3]);
        model.train();
        assert!(model.is_training());
        model.eval();
        assert!(!model.is_training());
    }

    #[test]
    fn config_replays_to_equal_config() {
        let model = mlp();
        let cfg = model.config().unwrap();
        let rebuilt = Model::from_config(&cfg).unwrap();
        assert_eq!(rebuilt.config().unwrap(), cfg);
        assert_eq!(rebuilt.num_parameters(), model.num_parameters());
    }

    #[test]
    fn wrong_input_width_is_rejected_at_run_time() {
        let model = mlp();
        let err = model.forward_one(&RawTensor::randn(&[2, 5])).unwrap_err();
        assert!(matches!(err, GraphError::ShapeMismatch { .. }));
    }

    #[test]
    fn duplicate_names_fail() {
        let x = input(vec![None, Some(4)]).unwrap();
        let a = Dense::new(2).with_name("same").call(&x).unwrap();
        let b = Dense::new(2).with_name("same").call(&x).unwrap();
        let y = Concat::default().call_many(&[a, b]).unwrap();
        let err = Model::new("dup", x, y).err().unwrap();
        assert!(matches!(err, GraphError::DuplicateLayerName(name) if name == "same"));
    }

    #[test]
    fn undeclared_input_fails() {
        let a = input(vec![None, Some(2)]).unwrap();
        let b = input(vec![None, Some(2)]).unwrap();
        let y = Concat::default().call_many(&[a.clone(), b]).unwrap();
        assert!(Model::new("partial", a, y).is_err());
    }

    #[test]
    fn disconnected_input_fails() {
        let a = input(vec![None, Some(2)]).unwrap();
        let b = input(vec![None, Some(2)]).unwrap();
        let y = Dense::new(1).call(&a).unwrap();
        assert!(Model::new("extra", vec![a, b], y).is_err());
    }

    #[test]
    fn shared_layer_called_outside_model_still_round_trips() {
        let shared = Dense::new(2).with_name("shared").shared();
        let outside = input(vec![None, Some(3)]).unwrap();
        shared.call_one(&outside).unwrap();

        let x = input(vec![None, Some(3)]).unwrap();
        let y = shared.call_one(&x).unwrap();
        let model = Model::new("reuse", x, y).unwrap();
        let cfg = model.config().unwrap();
        assert_eq!(cfg.layer("shared").unwrap().inbound.len(), 1);
        assert_eq!(cfg.outputs.nodes[0].index, 0);
        assert_eq!(Model::from_config(&cfg).unwrap().config().unwrap(), cfg);
    }

    #[test]
    fn state_dict_keys_and_strict_load() {
        let a = mlp();
        let b = Model::from_config(&a.config().unwrap()).unwrap();
        let keys: Vec<_> = a.state_dict().keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["dense_1/biases", "dense_1/weights", "logits/biases", "logits/weights"]
        );
        b.load_state_dict(&a.state_dict()).unwrap();
        let x = RawTensor::randn(&[3, 4]);
        assert_eq!(
            a.forward_one(&x).unwrap().to_vec(),
            b.forward_one(&x).unwrap().to_vec()
        );

        let mut partial = a.state_dict();
        partial.remove("logits/biases");
        assert!(matches!(
            b.load_state_dict(&partial),
            Err(GraphError::StateDict(_))
        ));
    }

    #[test]
    fn truncated_weights_are_rejected_before_any_write() {
        let a = mlp();
        let b = mlp();
        let before = b.state_dict();
        let mut state = a.state_dict();
        if let Some(td) = state.get_mut("logits/weights") {
            td.data.truncate(2);
        }
        let err = b.load_state_dict(&state).unwrap_err();
        assert!(err.to_string().contains("logits/weights"), "{err}");
        assert_eq!(b.state_dict(), before);
    }

    #[test]
    fn truncated_weights_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.gnm");
        let model = mlp();
        let mut state = model.state_dict();
        if let Some(td) = state.get_mut("dense_1/weights") {
            td.data.truncate(2);
        }
        let config = model.config().unwrap();
        ModelFile::new(Some(&config), Some(state))
            .unwrap()
            .write(&path)
            .unwrap();
        let Err(err) = Model::load(&path, true) else {
            panic!("expected load to fail");
        };
        assert!(matches!(err, GraphError::Format(_)), "{err}");
    }

    #[test]
    fn summary_lists_layers() {
        let text = mlp().to_string();
        assert!(text.contains("Model 'mlp' (static)"));
        assert!(text.contains("logits"));
        assert!(text.contains("[?, 3]"));
    }
}
