use crate::error::{GraphError, Result};
use crate::io::config::ModelConfig;
use crate::model::Model;
use crate::nn::layers::{
    Concat, Conv2d, Dense, Dropout, Flatten, Input, LayerList, MaxPool2d, ModelLayer,
};
use crate::nn::{Activation, Initializer, Layer, Shape};
use crate::ops::Padding;
use serde::{Deserialize, Serialize};

/// Constructor arguments of one layer, as stored in a model config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", content = "args")]
pub enum LayerConfig {
    Input {
        shape: Shape,
    },
    Conv2d {
        n_filter: usize,
        filter_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
        act: Option<Activation>,
        w_init: Initializer,
        b_init: Option<Initializer>,
        in_channels: Option<usize>,
    },
    MaxPool2d {
        filter_size: (usize, usize),
        strides: (usize, usize),
        padding: Padding,
    },
    Dense {
        n_units: usize,
        act: Option<Activation>,
        w_init: Initializer,
        b_init: Option<Initializer>,
        in_channels: Option<usize>,
    },
    Dropout {
        keep: f32,
    },
    Flatten,
    Concat {
        concat_dim: isize,
    },
    LayerList {
        layers: Vec<NamedLayerConfig>,
    },
    ModelLayer {
        model: Box<ModelConfig>,
    },
}

/// A sublayer entry inside a container config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedLayerConfig {
    pub name: String,
    pub layer: LayerConfig,
}

impl LayerConfig {
    pub fn class_name(&self) -> &'static str {
        match self {
            LayerConfig::Input { .. } => "Input",
            LayerConfig::Conv2d { .. } => "Conv2d",
            LayerConfig::MaxPool2d { .. } => "MaxPool2d",
            LayerConfig::Dense { .. } => "Dense",
            LayerConfig::Dropout { .. } => "Dropout",
            LayerConfig::Flatten => "Flatten",
            LayerConfig::Concat { .. } => "Concat",
            LayerConfig::LayerList { .. } => "LayerList",
            LayerConfig::ModelLayer { .. } => "ModelLayer",
        }
    }

    /// Construct a fresh, unbuilt layer named `name`.
    ///
    /// Layers whose input width is recorded (`in_channels`) are built
    /// immediately, so their parameters come from the recorded initializers.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Layer>> {
        let mut layer: Box<dyn Layer> = match self.clone() {
            LayerConfig::Input { shape } => Box::new(Input::new(shape)),
            LayerConfig::Conv2d {
                n_filter,
                filter_size,
                strides,
                padding,
                act,
                w_init,
                b_init,
                in_channels,
            } => {
                let mut conv = Conv2d::new(n_filter)
                    .filter_size(filter_size)
                    .strides(strides)
                    .padding(padding)
                    .w_init(w_init)
                    .b_init(b_init);
                if let Some(a) = act {
                    conv = conv.act(a);
                }
                if let Some(c) = in_channels {
                    conv = conv.in_channels(c);
                }
                Box::new(conv)
            }
            LayerConfig::MaxPool2d {
                filter_size,
                strides,
                padding,
            } => Box::new(
                MaxPool2d::new()
                    .filter_size(filter_size)
                    .strides(strides)
                    .padding(padding),
            ),
            LayerConfig::Dense {
                n_units,
                act,
                w_init,
                b_init,
                in_channels,
            } => {
                let mut dense = Dense::new(n_units).w_init(w_init).b_init(b_init);
                if let Some(a) = act {
                    dense = dense.act(a);
                }
                if let Some(c) = in_channels {
                    dense = dense.in_channels(c);
                }
                Box::new(dense)
            }
            LayerConfig::Dropout { keep } => Box::new(Dropout::new(keep)?),
            LayerConfig::Flatten => Box::new(Flatten::new()),
            LayerConfig::Concat { concat_dim } => Box::new(Concat::new(concat_dim)),
            LayerConfig::LayerList { layers } => {
                let sublayers = layers
                    .iter()
                    .map(|entry| entry.layer.instantiate(&entry.name))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(LayerList::from_boxed(sublayers))
            }
            LayerConfig::ModelLayer { model } => {
                let inner = Model::from_config(&model)?;
                Box::new(ModelLayer::new(inner)?)
            }
        };
        layer.set_name(name.to_string());
        Ok(layer)
    }
}

impl NamedLayerConfig {
    pub fn from_layer(layer: &dyn Layer) -> Result<Self> {
        let name = layer
            .name()
            .ok_or_else(|| GraphError::Graph(format!("unnamed {} layer", layer.kind())))?;
        Ok(Self {
            name: name.to_string(),
            layer: layer.config(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_config_json_shape() {
        let cfg = Conv2d::new(16).act(Activation::Relu).config();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["class"], "Conv2d");
        assert_eq!(json["args"]["n_filter"], 16);
        assert_eq!(json["args"]["padding"], "SAME");
        assert_eq!(json["args"]["act"], "relu");
    }

    #[test]
    fn flatten_round_trips_without_args() {
        let json = serde_json::to_string(&LayerConfig::Flatten).unwrap();
        let back: LayerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LayerConfig::Flatten);
    }

    #[test]
    fn instantiate_applies_name_and_builds_known_width() {
        let cfg = LayerConfig::Dense {
            n_units: 4,
            act: None,
            w_init: Initializer::Zeros,
            b_init: None,
            in_channels: Some(3),
        };
        let layer = cfg.instantiate("head").unwrap();
        assert_eq!(layer.name(), Some("head"));
        assert!(layer.is_built());
        assert_eq!(layer.config(), cfg);
    }
}
