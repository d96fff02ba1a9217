use crate::api::error::{GradError, GradResult};
use crate::api::layer::Module;
use crate::api::tensor::Tensor;
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One saved parameter.
#[derive(Debug, Clone)]
pub struct SavedParam {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Named parameter groups plus free-form string metadata, stored as a
/// safetensors file.
///
/// Parameters are named positionally: `<group>.<index>`, in the order the
/// module's `parameters()` returns them.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub params: Vec<SavedParam>,
    pub metadata: HashMap<String, String>,
}

fn param_name(group: &str, index: usize) -> String {
    format!("{group}.{index}")
}

fn checkpoint_err(e: impl std::fmt::Display) -> GradError {
    GradError::Checkpoint(e.to_string())
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every parameter of `module` under `group`.
    pub fn add_module(&mut self, group: &str, module: &dyn Module) {
        for (i, p) in module.parameters().iter().enumerate() {
            self.params.push(SavedParam {
                name: param_name(group, i),
                shape: p.shape().to_vec(),
                data: p.to_vec(),
            });
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Parameters stored under `group`, in positional order.
    pub fn group(&self, group: &str) -> Vec<&SavedParam> {
        let prefix = format!("{group}.");
        let mut found: Vec<(usize, &SavedParam)> = self
            .params
            .iter()
            .filter_map(|p| {
                p.name
                    .strip_prefix(&prefix)
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .map(|idx| (idx, p))
            })
            .collect();
        found.sort_by_key(|(idx, _)| *idx);
        found.into_iter().map(|(_, p)| p).collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.params.iter().map(|p| p.data.len()).sum()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> GradResult<()> {
        let bytes: Vec<Vec<u8>> = self
            .params
            .iter()
            .map(|p| p.data.iter().flat_map(|v| v.to_le_bytes()).collect())
            .collect();
        let views = self
            .params
            .iter()
            .zip(&bytes)
            .map(|(p, b)| {
                TensorView::new(Dtype::F32, p.shape.clone(), b)
                    .map(|view| (p.name.clone(), view))
                    .map_err(checkpoint_err)
            })
            .collect::<GradResult<Vec<_>>>()?;
        let metadata = (!self.metadata.is_empty()).then(|| self.metadata.clone());
        safetensors::serialize_to_file(views, &metadata, path.as_ref()).map_err(checkpoint_err)?;
        log::debug!(
            "saved {} tensors ({} values) to {}",
            self.params.len(),
            self.parameter_count(),
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> GradResult<Self> {
        let buf = fs::read(path.as_ref())?;
        let (_, header) = SafeTensors::read_metadata(&buf).map_err(checkpoint_err)?;
        let metadata = header.metadata().clone().unwrap_or_default();
        let tensors = SafeTensors::deserialize(&buf).map_err(checkpoint_err)?;

        let mut params = Vec::new();
        for (name, view) in tensors.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(GradError::Checkpoint(format!(
                    "tensor {name} has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }
            let data = view
                .data()
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            params.push(SavedParam {
                name,
                shape: view.shape().to_vec(),
                data,
            });
        }
        params.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { params, metadata })
    }

    /// Copy the `group` parameters into `module`, in place.
    pub fn load_into_module(&self, group: &str, module: &mut dyn Module) -> GradResult<()> {
        let saved = self.group(group);
        let mut params = module.parameters_mut();
        if params.len() != saved.len() {
            return Err(GradError::Checkpoint(format!(
                "checkpoint group '{group}' has {} params, model has {}",
                saved.len(),
                params.len()
            )));
        }
        for (param, saved) in params.iter_mut().zip(saved) {
            if param.shape() != saved.shape.as_slice() {
                return Err(GradError::ShapeMismatch {
                    expected: param.shape().to_vec(),
                    got: saved.shape.clone(),
                });
            }
            let tensor = Tensor::from_vec(saved.data.clone(), &saved.shape)?;
            param.update_data_from(&tensor);
        }
        Ok(())
    }
}

/// Convenience: save a single module under the group `model`.
pub fn save_checkpoint<P: AsRef<Path>>(module: &dyn Module, path: P) -> GradResult<()> {
    let mut checkpoint = Checkpoint::new();
    checkpoint.add_module("model", module);
    checkpoint.save(path)
}

/// Convenience: load the group `model` from path into `module`.
pub fn load_checkpoint<P: AsRef<Path>>(module: &mut dyn Module, path: P) -> GradResult<Checkpoint> {
    let checkpoint = Checkpoint::load(path)?;
    checkpoint.load_into_module("model", module)?;
    Ok(checkpoint)
}
