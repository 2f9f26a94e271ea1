//! Layer graphs with structural save and load.
//!
//! Models are assembled either statically, by calling layers on symbolic
//! [`Node`]s, or dynamically through a user [`Network`]. Static models
//! serialize their topology as a [`ModelConfig`] and can be rebuilt from
//! a file with or without weights.

pub mod autograd;
pub mod data;
pub mod error;
pub mod io;
pub mod logging;
pub mod model;
pub mod models;
pub mod nn;
pub mod ops;
pub mod tensor;
pub mod train;

pub use error::{GraphError, Result};
pub use io::config::ModelConfig;
pub use io::{StateDict, TensorData};
pub use model::{Model, Network, NodeList};
pub use nn::{
    Activation, Adam, CallLayer, Concat, Conv2d, Dense, Dropout, Flatten, Initializer, Input,
    Layer, LayerConfig, LayerHandle, LayerList, MaxPool2d, ModelLayer, Node, Optimizer, SGD,
    Shape, input,
};
pub use ops::Padding;
pub use tensor::{RawTensor, Tensor, TensorOps, check_gradients_simple, cross_entropy, mse_loss};
