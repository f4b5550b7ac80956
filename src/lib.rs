//! digitserve: a JSON web service that classifies a single handwritten digit
//! image with a pretrained TorchScript model

pub mod config;
pub mod inference;
pub mod preprocess;
pub mod server;
pub mod torch;

pub use inference::{Classifier, Prediction, Predictor};
pub use torch::TorchClassifier;
