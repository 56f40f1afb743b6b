use crate::{
    network::{ActorCritic, ActorCriticNet},
    shared_model::SharedModel,
};
use anyhow::{Result, anyhow};
use candle_core::{DType, Tensor, Var, backprop::GradStore};
use candle_nn::{VarBuilder, VarMap};

/// A learner's private copy of the shared network. Gradients are computed here and then
/// re-keyed onto the shared variables.
pub struct LocalModel {
    network: ActorCriticNet,
    // (local, shared), matched by variable name
    pairs: Vec<(Var, Var)>,
    _varmap: VarMap,
}

impl LocalModel {
    pub fn mirror(shared: &SharedModel) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, shared.device());
        let network = ActorCriticNet::build(shared.kind(), shared.dims(), &vb)?;
        let shared_vars = shared.named_vars()?;
        let local_vars = varmap
            .data()
            .lock()
            .map_err(|_| anyhow!("local varmap lock poisoned"))?
            .clone();
        if local_vars.len() != shared_vars.len() {
            return Err(anyhow!(
                "local model has {} variables, shared model has {}",
                local_vars.len(),
                shared_vars.len()
            ));
        }
        let pairs = shared_vars
            .into_iter()
            .map(|(name, shared_var)| {
                local_vars
                    .get(&name)
                    .map(|local_var| (local_var.clone(), shared_var))
                    .ok_or_else(|| anyhow!("local model has no variable `{name}`"))
            })
            .collect::<Result<Vec<_>>>()?;
        let local = Self {
            network,
            pairs,
            _varmap: varmap,
        };
        local.pull()?;
        Ok(local)
    }

    /// Copies the current shared weights into the local network. Reads are not synchronized
    /// with concurrent updates.
    pub fn pull(&self) -> Result<()> {
        for (local, shared) in &self.pairs {
            local.set(shared.as_tensor())?;
        }
        Ok(())
    }

    pub fn forward(&self, chart: &Tensor, balance: &Tensor) -> candle_core::Result<(Tensor, Tensor)> {
        self.network.forward(chart, balance)
    }

    /// Backpropagates `loss` through the local network and returns the gradients keyed by the
    /// shared variables.
    pub fn shared_grads(&self, loss: &Tensor) -> Result<GradStore> {
        let mut grads = loss.backward()?;
        for (local, shared) in &self.pairs {
            if let Some(grad) = grads.remove(local.as_tensor()) {
                grads.insert(shared.as_tensor(), grad);
            }
        }
        Ok(grads)
    }
}
