use crate::inference::Prediction;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// An inference request: one image, encoded as base 64 and optionally
/// prefixed with a `data:` URL header
#[derive(Deserialize)]
pub struct PredictRequest {
    pub image: String,
}

impl Debug for PredictRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PredictRequest {{ image: <{} chars> }}", self.image.len())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Prediction,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub message: String,
    pub classes: usize,
}

/// Body of every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Which stage failed: `base64`, `image`, `inference` or `server`
    pub stage: String,
    pub errors: Vec<String>,
}
