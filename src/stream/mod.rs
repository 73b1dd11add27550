pub mod transformer;

pub use transformer::{StreamTransformer, TransformConfig};
