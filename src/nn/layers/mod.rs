pub mod concat;
pub mod conv;
pub mod dense;
pub mod dropout;
pub mod flatten;
pub mod input;
pub mod layer_list;
pub mod maxpool;
pub mod model_layer;

pub use concat::Concat;
pub use conv::Conv2d;
pub use dense::Dense;
pub use dropout::Dropout;
pub use flatten::Flatten;
pub use input::Input;
pub use layer_list::LayerList;
pub use maxpool::MaxPool2d;
pub use model_layer::ModelLayer;
