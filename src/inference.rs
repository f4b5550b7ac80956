//! Reduce a classifier's output to a single digit label, and the request
//! pipeline that feeds it.

use crate::preprocess::{self, CanonicalTensor, DecodeError};
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// Anything that went wrong while serving one prediction
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl PredictError {
    /// The pipeline stage that failed
    pub fn stage(&self) -> &'static str {
        match self {
            PredictError::Decode(DecodeError::InvalidBase64(_)) => "base64",
            PredictError::Decode(DecodeError::UnreadableImage(_)) => "image",
            PredictError::Inference(_) => "inference",
        }
    }
}

/// A predicted class label
pub type Prediction = usize;

/// Raw per-class scores, shaped (batch, num_classes) and stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    batch: usize,
    num_classes: usize,
    values: Vec<f32>,
}

impl Scores {
    pub fn new(batch: usize, num_classes: usize, values: Vec<f32>) -> Result<Self, InferenceError> {
        if values.len() != batch * num_classes {
            return Err(InferenceError::ExecutionFailed(format!(
                "classifier returned {} scores for shape ({batch}, {num_classes})",
                values.len()
            )));
        }
        Ok(Scores {
            batch,
            num_classes,
            values,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.batch, self.num_classes)
    }

    /// Scores of one batch item
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        if index >= self.batch {
            return None;
        }
        let start = index * self.num_classes;
        self.values.get(start..start + self.num_classes)
    }
}

/// A loaded, ready-to-run classifier. Implementations are shared read-only
/// between concurrent requests.
pub trait Classifier: Send + Sync + Debug {
    /// Run one forward pass over a single canonical tensor
    fn forward(&self, tensor: &CanonicalTensor) -> Result<Scores, InferenceError>;

    /// Size of the label space
    fn num_classes(&self) -> usize;
}

/// Index of the largest value. Ties go to the lowest index.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, max)) if v <= max => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Classify a single canonical tensor
pub fn predict(
    tensor: &CanonicalTensor,
    classifier: &dyn Classifier,
) -> Result<Prediction, InferenceError> {
    let scores = classifier.forward(tensor)?;

    let (batch, _) = scores.shape();
    if batch != 1 {
        return Err(InferenceError::ExecutionFailed(format!(
            "expected a batch of 1, classifier returned {batch}"
        )));
    }

    let row = scores
        .row(0)
        .ok_or_else(|| InferenceError::ExecutionFailed("missing batch item 0".into()))?;
    if row.iter().any(|v| v.is_nan()) {
        return Err(InferenceError::ExecutionFailed(
            "classifier produced NaN scores".into(),
        ));
    }

    argmax(row).ok_or_else(|| InferenceError::ExecutionFailed("classifier returned no classes".into()))
}

/// Shared handle to the process-wide classifier, passed to every request
#[derive(Debug, Clone)]
pub struct Predictor {
    classifier: Arc<dyn Classifier>,
}

impl Predictor {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Predictor { classifier }
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.num_classes()
    }

    /// Decode a base64 image payload and classify it
    pub fn predict_payload(&self, payload: &str) -> Result<Prediction, PredictError> {
        let tensor = preprocess::normalize(payload)?;
        let prediction = predict(&tensor, self.classifier.as_ref()).map_err(|e| {
            warn!("inference failed: {e}");
            e
        })?;
        debug!("predicted class {prediction}");
        Ok(prediction)
    }
}
