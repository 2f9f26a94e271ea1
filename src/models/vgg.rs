use crate::error::{GraphError, Result};
use crate::model::{Model, Network};
use crate::nn::{
    Activation, CallLayer, Conv2d, Dense, Flatten, Layer, LayerList, MaxPool2d, Shape, input,
};
use crate::tensor::Tensor;

/// Static graph or imperative forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VggMode {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Clone)]
pub struct VggOptions {
    pub mode: VggMode,
    /// `(height, width, channels)`
    pub input_shape: (usize, usize, usize),
    pub n_classes: usize,
    /// Last layer to keep, e.g. `"conv3_1"`, `"pool5"`, `"fc2_relu"`
    pub end_with: String,
}

impl Default for VggOptions {
    fn default() -> Self {
        Self {
            mode: VggMode::Static,
            input_shape: (224, 224, 3),
            n_classes: 1000,
            end_with: "outputs".to_string(),
        }
    }
}

const VGG16_BLOCKS: [usize; 5] = [2, 2, 3, 3, 3];
const VGG19_BLOCKS: [usize; 5] = [2, 2, 4, 4, 4];
const FILTERS: [usize; 5] = [64, 128, 256, 512, 512];

/// Every layer name in build order, used to validate `end_with`
fn layer_names(blocks: &[usize]) -> Vec<String> {
    let mut names = Vec::new();
    for (b, &convs) in blocks.iter().enumerate() {
        names.extend((1..=convs).map(|i| format!("conv{}_{i}", b + 1)));
        names.push(format!("pool{}", b + 1));
    }
    names.extend(["flatten", "fc1_relu", "fc2_relu", "outputs"].map(String::from));
    names
}

/// Feature blocks and classifier head as nested `LayerList`s, cut after
/// `end_with`. Convolutions get their input channels up front, so every
/// weight is allocated here.
fn make_layers(name: &str, blocks: &[usize], options: &VggOptions) -> Result<LayerList> {
    if !layer_names(blocks).contains(&options.end_with) {
        return Err(GraphError::InvalidParameter(format!(
            "unknown end_with layer '{}'",
            options.end_with
        )));
    }

    let mut stack = LayerList::new().with_name(name);
    let mut in_channels = options.input_shape.2;
    let mut spatial = (options.input_shape.0, options.input_shape.1);
    for (b, (&convs, &filters)) in blocks.iter().zip(&FILTERS).enumerate() {
        let mut block = LayerList::new().with_name(format!("block{}", b + 1));
        let mut done = false;
        for i in 1..=convs {
            let conv_name = format!("conv{}_{i}", b + 1);
            block = block.push(
                Conv2d::new(filters)
                    .act(Activation::Relu)
                    .in_channels(in_channels)
                    .with_name(conv_name.clone()),
            );
            in_channels = filters;
            if conv_name == options.end_with {
                done = true;
                break;
            }
        }
        if !done {
            let pool_name = format!("pool{}", b + 1);
            block = block.push(
                MaxPool2d::new()
                    .filter_size((2, 2))
                    .strides((2, 2))
                    .with_name(pool_name.clone()),
            );
            spatial = (spatial.0.div_ceil(2), spatial.1.div_ceil(2));
            done = pool_name == options.end_with;
        }
        stack = stack.push(block);
        if done {
            return Ok(stack);
        }
    }

    stack = stack.push(Flatten::new().with_name("flatten"));
    if options.end_with == "flatten" {
        return Ok(stack);
    }
    let features = spatial.0 * spatial.1 * in_channels;
    stack = stack.push(
        Dense::new(4096)
            .act(Activation::Relu)
            .in_channels(features)
            .with_name("fc1_relu"),
    );
    if options.end_with == "fc1_relu" {
        return Ok(stack);
    }
    stack = stack.push(
        Dense::new(4096)
            .act(Activation::Relu)
            .in_channels(4096)
            .with_name("fc2_relu"),
    );
    if options.end_with == "fc2_relu" {
        return Ok(stack);
    }
    Ok(stack.push(
        Dense::new(options.n_classes)
            .in_channels(4096)
            .with_name("outputs"),
    ))
}

struct Vgg {
    layers: LayerList,
}

impl Network for Vgg {
    fn forward(&self, x: &Tensor, training: bool) -> Result<Tensor> {
        self.layers.forward(std::slice::from_ref(x), training)
    }

    fn layers(&self) -> Vec<&dyn Layer> {
        vec![&self.layers]
    }
}

fn build(name: &str, blocks: &[usize], options: &VggOptions) -> Result<Model> {
    let mut layers = make_layers(name, blocks, options)?;
    let (h, w, c) = options.input_shape;
    let shape: Shape = vec![None, Some(h), Some(w), Some(c)];
    tracing::info!(model = name, mode = ?options.mode, end_with = %options.end_with, "building VGG");
    match options.mode {
        VggMode::Static => {
            let ni = input(shape)?;
            let nn = layers.call(&ni)?;
            Model::new(name, ni, nn)
        }
        VggMode::Dynamic => {
            layers.build(&[shape])?;
            Model::dynamic(name, Vgg { layers })
        }
    }
}

/// VGG-16: 13 convolutions in five blocks plus a three-layer head
pub fn vgg16(options: VggOptions) -> Result<Model> {
    build("vgg16", &VGG16_BLOCKS, &options)
}

/// VGG-19: 16 convolutions in five blocks plus a three-layer head
pub fn vgg19(options: VggOptions) -> Result<Model> {
    build("vgg19", &VGG19_BLOCKS, &options)
}
