//! Tract remover: ONNX segmentation inference in pure Rust
//!
//! Loads an ISNet-style segmentation model (`1x3xSxS` input, `1x1xSxS` mask
//! output) and runs it on the blocking thread pool. Progress is reported with
//! the phases `compute:decode`, `compute:inference`, `compute:mask` and
//! `compute:encode`, each as `0/1` then `1/1` (decode only reports `1/1`).

use super::segmentation::{self, SegmentationInput};
use super::{BackgroundRemover, ProgressEvent, ProgressSink};
use crate::error::{BgtifyError, Result};
use crate::types::{NormalizedFile, RemovalResult};
use async_trait::async_trait;
use instant::Instant;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Configuration of a [`TractRemover`]
#[derive(Debug, Clone, PartialEq)]
pub struct TractRemoverConfig {
    /// Path to the `.onnx` model file
    pub model_path: PathBuf,
    /// Model input geometry and normalization
    pub input: SegmentationInput,
}

impl TractRemoverConfig {
    pub fn new<P: Into<PathBuf>>(model_path: P) -> Self {
        Self {
            model_path: model_path.into(),
            input: SegmentationInput::default(),
        }
    }
}

/// Background remover running a segmentation model with Tract
pub struct TractRemover {
    model: Arc<TractModel>,
    input: SegmentationInput,
    name: String,
}

impl std::fmt::Debug for TractRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractRemover")
            .field("name", &self.name)
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}

impl TractRemover {
    /// Load and optimize the model
    ///
    /// # Errors
    /// - Missing or unreadable model file
    /// - Model incompatible with the configured input shape
    pub fn load(config: &TractRemoverConfig) -> Result<Self> {
        let load_start = Instant::now();
        let path = config.model_path.as_path();

        if !path.is_file() {
            return Err(BgtifyError::invalid_config(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        let size = config.input.target_size as usize;
        let model = onnx()
            .model_for_path(path)
            .map_err(|e| model_error(path, "load", &e))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| model_error(path, "configure input of", &e))?
            .into_optimized()
            .map_err(|e| model_error(path, "optimize", &e))?
            .into_runnable()
            .map_err(|e| model_error(path, "prepare", &e))?;

        let name = path
            .file_stem()
            .map_or_else(|| "tract".to_string(), |s| s.to_string_lossy().into_owned());

        tracing::info!(
            model = %path.display(),
            input_size = size,
            elapsed_ms = load_start.elapsed().as_millis() as u64,
            "Tract model ready"
        );

        Ok(Self {
            model: Arc::new(model),
            input: config.input.clone(),
            name,
        })
    }

    fn infer(model: &TractModel, input: &Array4<f32>) -> Result<Array4<f32>> {
        let shape = input.shape().to_vec();
        let data = input
            .as_slice()
            .ok_or_else(|| BgtifyError::removal("Input tensor is not contiguous"))?;
        let tensor = Tensor::from_shape(&shape, data)
            .map_err(|e| BgtifyError::removal(format!("Failed to build input tensor: {e}")))?;

        let outputs = model
            .run(tvec!(tensor.into()))
            .map_err(|e| BgtifyError::removal(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgtifyError::removal("No output tensor found"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| BgtifyError::removal(format!("Failed to read output tensor: {e}")))?;

        let dims: [usize; 4] = view.shape().try_into().map_err(|_| {
            BgtifyError::removal(format!("Expected 4D output tensor, got {}D", view.ndim()))
        })?;
        let values: Vec<f32> = view.iter().copied().collect();

        Array4::from_shape_vec(dims, values)
            .map_err(|e| BgtifyError::removal(format!("Failed to reshape output tensor: {e}")))
    }

    fn run_blocking(
        model: &TractModel,
        input: &SegmentationInput,
        bytes: &[u8],
        progress: &dyn ProgressSink,
    ) -> Result<Vec<u8>> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| BgtifyError::removal(format!("Failed to decode image: {e}")))?;
        let dimensions = (image.width(), image.height());
        progress.on_progress(ProgressEvent::new("compute:decode", 1, 1));

        let tensor = segmentation::preprocess(&image, input)?;

        progress.on_progress(ProgressEvent::new("compute:inference", 0, 1));
        let inference_start = Instant::now();
        let output = Self::infer(model, &tensor)?;
        tracing::debug!(
            elapsed_ms = inference_start.elapsed().as_millis() as u64,
            "Tract inference completed"
        );
        progress.on_progress(ProgressEvent::new("compute:inference", 1, 1));

        progress.on_progress(ProgressEvent::new("compute:mask", 0, 1));
        let mask = segmentation::mask_from_output(&output, dimensions)?;
        let cutout = segmentation::apply_mask(&image, &mask);
        progress.on_progress(ProgressEvent::new("compute:mask", 1, 1));

        progress.on_progress(ProgressEvent::new("compute:encode", 0, 1));
        let png = segmentation::encode_png(cutout)?;
        progress.on_progress(ProgressEvent::new("compute:encode", 1, 1));

        Ok(png)
    }
}

fn model_error(path: &Path, operation: &str, error: &impl std::fmt::Display) -> BgtifyError {
    BgtifyError::invalid_config(format!(
        "Failed to {operation} model '{}': {error}",
        path.display()
    ))
}

#[async_trait]
impl BackgroundRemover for TractRemover {
    fn name(&self) -> &str {
        &self.name
    }

    async fn remove_background(
        &self,
        file: &NormalizedFile,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RemovalResult> {
        let model = Arc::clone(&self.model);
        let input = self.input.clone();
        let payload = file.payload();

        let png = tokio::task::spawn_blocking(move || {
            Self::run_blocking(&model, &input, &payload, progress.as_ref())
        })
        .await
        .map_err(|e| BgtifyError::removal(format!("Removal task failed: {e}")))??;

        Ok(RemovalResult::png(png))
    }
}
