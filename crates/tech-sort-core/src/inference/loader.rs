//! Model loading utilities for safetensors format.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use once_cell::sync::OnceCell;
use safetensors::SafeTensors;
use tracing::{debug, warn};

/// A model that is built from its weight file on first access.
///
/// The outcome of the first load is kept: a missing or broken file is
/// reported once and then fails fast on every later call.
pub struct LazyModel<T> {
    path: PathBuf,
    device: Device,
    builder: fn(VarBuilder) -> Result<T>,
    state: OnceCell<Result<T, String>>,
}

impl<T: Send + Sync> LazyModel<T> {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, device: Device, builder: fn(VarBuilder) -> Result<T>) -> Self {
        Self {
            path: path.into(),
            device,
            builder,
            state: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gets the model, loading it if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the weight file cannot be read or parsed, or the
    /// builder rejects it.
    pub fn get(&self) -> Result<&T> {
        self.state
            .get_or_init(|| {
                let built = load_safetensors(&self.path, &self.device).and_then(self.builder);
                built.map_err(|e| {
                    warn!("Model {} unavailable: {e:#}", self.path.display());
                    format!("{e:#}")
                })
            })
            .as_ref()
            .map_err(|e| anyhow!("model {} unavailable: {e}", self.path.display()))
    }

    /// Returns true if the model has been loaded successfully.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.state.get(), Some(Ok(_)))
    }
}

/// Reads a safetensors file into a `VarBuilder`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds an unsupported dtype.
pub fn load_safetensors(path: impl AsRef<Path>, device: &Device) -> Result<VarBuilder<'static>> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;
    let tensors = tensors_from_bytes(&data, device)
        .with_context(|| format!("Failed to parse safetensors: {}", path.display()))?;
    debug!(path = %path.display(), tensors = tensors.len(), "weights loaded");
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}

fn tensors_from_bytes(data: &[u8], device: &Device) -> Result<HashMap<String, Tensor>> {
    SafeTensors::deserialize(data)?
        .tensors()
        .into_iter()
        .map(|(name, view)| {
            let dtype = candle_dtype(view.dtype())?;
            let tensor = Tensor::from_raw_buffer(view.data(), dtype, view.shape(), device)
                .with_context(|| format!("Failed to create tensor '{name}'"))?;
            Ok((name, tensor))
        })
        .collect()
}

fn candle_dtype(dtype: safetensors::Dtype) -> Result<DType> {
    use safetensors::Dtype as S;
    Ok(match dtype {
        S::F32 => DType::F32,
        S::F64 => DType::F64,
        S::F16 => DType::F16,
        S::BF16 => DType::BF16,
        S::I64 => DType::I64,
        S::U8 => DType::U8,
        S::U32 => DType::U32,
        other => anyhow::bail!("Unsupported dtype: {other:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[allow(clippy::expect_used)]
    fn weights_file() -> NamedTempFile {
        use safetensors::tensor::TensorView;

        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let view = TensorView::new(safetensors::Dtype::F32, vec![2, 2], bytemuck::cast_slice(&data))
            .expect("valid tensor view");
        let bytes = safetensors::serialize(HashMap::from([("w".to_string(), view)]), &None)
            .expect("serialize");

        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(&bytes).expect("write");
        file
    }

    #[test]
    fn test_load_safetensors() {
        let file = weights_file();
        let vb = load_safetensors(file.path(), &Device::Cpu).unwrap();
        let w = vb.get((2, 2), "w").unwrap();
        assert_eq!(w.to_vec2::<f32>().unwrap(), vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_load_safetensors_missing_file() {
        assert!(load_safetensors("/nonexistent/path.safetensors", &Device::Cpu).is_err());
    }

    #[test]
    fn test_lazy_model_remembers_failure() {
        fn build(_vb: VarBuilder) -> Result<u32> {
            Ok(7)
        }
        let missing = LazyModel::new("/nonexistent/model.safetensors", Device::Cpu, build);
        assert!(missing.get().is_err());
        assert!(missing.get().is_err());
        assert!(!missing.is_loaded());

        let file = weights_file();
        let present = LazyModel::new(file.path(), Device::Cpu, build);
        assert_eq!(*present.get().unwrap(), 7);
        assert!(present.is_loaded());
    }
}
