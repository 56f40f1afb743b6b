use crate::network::{ActorCritic, ActorCriticNet, NetworkDims};
use a3c_core::{CheckpointError, ModelKind};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use std::{collections::HashMap, fs, path::Path};
use tracing::debug;

/// The global network every learner reads from and every update is applied to.
pub struct SharedModel {
    kind: ModelKind,
    dims: NetworkDims,
    varmap: VarMap,
    network: ActorCriticNet,
    device: Device,
}

impl SharedModel {
    pub fn build(kind: ModelKind, dims: NetworkDims, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let network = ActorCriticNet::build(kind, &dims, &vb)?;
        Ok(Self {
            kind,
            dims,
            varmap,
            network,
            device: device.clone(),
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn dims(&self) -> &NetworkDims {
        &self.dims
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn all_vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    pub fn forward(&self, chart: &Tensor, balance: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        self.network.forward(chart, balance)
    }

    /// Variables sorted by name.
    pub fn named_vars(&self) -> Result<Vec<(String, Var)>> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| CheckpointError::Poisoned)?;
        let mut vars: Vec<_> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        vars.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(vars)
    }

    /// Detached copies of the current weights.
    pub fn weights(&self) -> Result<HashMap<String, Tensor>> {
        self.named_vars()?
            .into_iter()
            .map(|(name, var)| Ok((name, var.as_tensor().copy()?.detach())))
            .collect()
    }

    pub fn save_weights(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating checkpoint directory {}", parent.display()))?;
        }
        self.varmap
            .save(path)
            .with_context(|| format!("saving checkpoint to {}", path.display()))?;
        debug!(path = %path.display(), "weights saved");
        Ok(())
    }

    /// Overwrites every variable with the tensor of the same name stored at `path`.
    pub fn load_weights(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(CheckpointError::Missing(path.to_path_buf()).into());
        }
        let tensors = candle_core::safetensors::load(path, &self.device)
            .with_context(|| format!("reading checkpoint {}", path.display()))?;
        for (name, var) in self.named_vars()? {
            let tensor = tensors
                .get(&name)
                .ok_or_else(|| CheckpointError::MissingTensor {
                    path: path.to_path_buf(),
                    name: name.clone(),
                })?;
            var.set(tensor)
                .with_context(|| format!("restoring `{name}` from {}", path.display()))?;
        }
        debug!(path = %path.display(), "weights loaded");
        Ok(())
    }
}
