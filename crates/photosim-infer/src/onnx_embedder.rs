//! ONNX-based image embedding engine.
//!
//! Loads a MobileNet-style ONNX image model whose output is a pooled
//! feature vector. Requires the `onnx` feature.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use ndarray::Array1;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use photosim_core::{Error, Result};
    use tracing::info;

    use crate::embedder::EmbedderBackend;
    use crate::preprocess::PreparedImage;

    /// ONNX image embedder. Input `[1, H, W, 3]` in `[-1, 1]`, output `[1, D]`.
    pub struct OnnxImageEmbedder {
        session: Mutex<Session>,
        dimension: usize,
        model_id: String,
    }

    impl OnnxImageEmbedder {
        /// Load `model_dir/model.onnx` and probe its output dimension.
        pub fn load(model_dir: &Path) -> std::result::Result<Self, String> {
            let model_path = model_dir.join("model.onnx");
            if !model_path.exists() {
                return Err(format!("Model not found: {}", model_path.display()));
            }

            // With load-dynamic feature, ORT_DYLIB_PATH env var must point to libonnxruntime.so
            ort::init().commit();

            let session = Session::builder()
                .map_err(|e| format!("Failed to create session builder: {}", e))?
                .with_intra_threads(2)
                .map_err(|e| format!("Failed to set threads: {}", e))?
                .commit_from_file(&model_path)
                .map_err(|e| format!("Failed to load ONNX model: {}", e))?;

            let stem = model_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("model");
            let size = std::fs::metadata(&model_path).map(|m| m.len()).unwrap_or(0);

            let mut embedder = Self {
                session: Mutex::new(session),
                dimension: 0,
                model_id: format!("onnx-{}-{}", stem, size),
            };

            // One dummy inference fixes the output dimension for the model's lifetime.
            let probe = PreparedImage::new(224, 224, vec![0u8; 224 * 224 * 3])
                .map_err(|e| e.to_string())?;
            let dimension = embedder.infer(&probe).map_err(|e| e.to_string())?.len();
            embedder.dimension = dimension;

            info!(
                "ONNX image embedder loaded: dim={}, model={}",
                dimension,
                model_path.display()
            );
            Ok(embedder)
        }

        fn infer(&self, image: &PreparedImage) -> Result<Array1<f32>> {
            // Normalise to [-1, 1], NHWC layout
            let data: Vec<f32> = image
                .rgb
                .iter()
                .map(|&v| v as f32 / 127.5 - 1.0)
                .collect();
            let shape = [1usize, image.height as usize, image.width as usize, 3];
            let input = Tensor::from_array((shape, data))
                .map_err(|e| Error::Embedding(format!("Failed to create input tensor: {}", e)))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| Error::Embedding(format!("ONNX inference failed: {}", e)))?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Embedding(format!("Failed to extract output tensor: {}", e)))?;

            let dims: Vec<i64> = shape.iter().copied().collect();
            let dim = match dims.as_slice() {
                [1, d] | [1, 1, 1, d] => output_dim(*d)?,
                other => {
                    return Err(Error::Embedding(format!(
                        "Unexpected output shape: {:?}",
                        other
                    )))
                }
            };
            let values = data.get(..dim).ok_or_else(|| {
                Error::Embedding(format!(
                    "model declared {} outputs but returned {}",
                    dim,
                    data.len()
                ))
            })?;
            Ok(Array1::from_vec(values.to_vec()))
        }
    }

    /// Declared feature length; dynamic (`-1`) or zero sizes are rejected.
    pub(super) fn output_dim(d: i64) -> Result<usize> {
        usize::try_from(d)
            .ok()
            .filter(|&d| d > 0)
            .ok_or_else(|| Error::Embedding(format!("Unusable output dimension: {}", d)))
    }

    impl EmbedderBackend for OnnxImageEmbedder {
        fn embed(&self, image: &PreparedImage) -> Result<Array1<f32>> {
            let embedding = self.infer(image)?;
            if embedding.len() != self.dimension {
                return Err(Error::Embedding(format!(
                    "model returned {} dims, expected {}",
                    embedding.len(),
                    self.dimension
                )));
            }
            Ok(embedding)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn is_available(&self) -> bool {
            true
        }
    }
}

#[cfg(feature = "onnx")]
pub use inner::OnnxImageEmbedder;
