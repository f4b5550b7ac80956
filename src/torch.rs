//! Code for loading and running the (trained) TorchScript digit classifier

use crate::inference::{Classifier, InferenceError, Scores};
use crate::preprocess::{CanonicalTensor, TENSOR_SHAPE};
use std::path::{Path, PathBuf};
use tch::{no_grad, CModule, Device, Kind, TchError, Tensor};
use thiserror::Error;
use tracing::{debug, info};

/// Startup failures. Any of these means the service cannot serve requests.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model unavailable at {path:?}: {source}")]
    ModelUnavailable {
        path: PathBuf,
        #[source]
        source: TchError,
    },

    /// The module does not take a single `[1, 1, 28, 28]` input, or does not
    /// return `(1, num_classes)` scores for it
    #[error("model violates the classifier input contract: {0}")]
    InputContract(String),
}

/// Load and run a TorchScript file
#[derive(Debug)]
pub struct TorchClassifier {
    /// The loaded torch model
    model: CModule,

    num_classes: usize,
}

impl TorchClassifier {
    /// Load the model on the CPU and check it with a probe forward pass
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let mut model =
            CModule::load_on_device(path, Device::Cpu).map_err(|source| LoadError::ModelUnavailable {
                path: path.to_path_buf(),
                source,
            })?;
        model.set_eval();

        // A module expecting more (or other) inputs fails here rather than
        // on the first request
        let probe = run_forward(&model, &CanonicalTensor::zeros())
            .map_err(|e| LoadError::InputContract(format!("probe forward pass failed: {e}")))?;
        let size = probe.size();
        debug!("probe output shape {size:?}");

        let num_classes = match size.as_slice() {
            [1, n] if *n > 0 => *n as usize,
            _ => {
                return Err(LoadError::InputContract(format!(
                    "expected output shape (1, num_classes), got {size:?}"
                )))
            }
        };

        info!("loaded classifier {path:?} with {num_classes} classes");
        Ok(TorchClassifier { model, num_classes })
    }
}

fn run_forward(model: &CModule, tensor: &CanonicalTensor) -> Result<Tensor, TchError> {
    let shape = TENSOR_SHAPE.map(|d| d as i64);
    let input = Tensor::from_slice(tensor.as_slice()).f_reshape(shape)?;
    no_grad(|| model.forward_ts(&[input]))
}

impl Classifier for TorchClassifier {
    fn forward(&self, tensor: &CanonicalTensor) -> Result<Scores, InferenceError> {
        let failed = |e: TchError| InferenceError::ExecutionFailed(e.to_string());

        let output = run_forward(&self.model, tensor).map_err(failed)?;
        let (batch, classes) = match output.size().as_slice() {
            [b, c] => (*b as usize, *c as usize),
            other => {
                return Err(InferenceError::ExecutionFailed(format!(
                    "expected 2-D output, got shape {other:?}"
                )))
            }
        };

        // Models exported in double precision still produce f32 scores
        let flat = output
            .f_to_kind(Kind::Float)
            .and_then(|t| t.f_reshape([-1i64]))
            .map_err(failed)?;
        let values = Vec::<f32>::try_from(&flat).map_err(failed)?;
        Scores::new(batch, classes, values)
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}
