//! Reference architectures
pub mod vgg;

pub use vgg::{VggMode, VggOptions, vgg16, vgg19};
