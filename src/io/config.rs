use crate::nn::LayerConfig;
use serde::{Deserialize, Serialize};

/// Reference to the `index`-th node produced by layer `layer` inside one model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub layer: String,
    pub index: usize,
}

/// Model inputs or outputs; `is_list` remembers whether the model was
/// declared with a list or a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRefs {
    pub nodes: Vec<NodeRef>,
    pub is_list: bool,
}

/// One layer of a static model: its constructor arguments and, per call,
/// the nodes it was applied to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEntry {
    pub name: String,
    pub config: LayerConfig,
    pub inbound: Vec<Vec<NodeRef>>,
}

/// Serializable topology of a static model
///
/// Layers appear in topological order of first use. Two models are
/// structurally identical exactly when their configs compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub version: String,
    pub inputs: NodeRefs,
    pub outputs: NodeRefs,
    pub layers: Vec<LayerEntry>,
}

impl ModelConfig {
    pub fn to_json_pretty(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerEntry> {
        self.layers.iter().find(|entry| entry.name == name)
    }
}
