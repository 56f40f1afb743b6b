use crate::{clip_grad::clip_grad_norm, shared_model::SharedModel};
use a3c_core::CheckpointError;
use anyhow::Result;
use candle_core::{Var, backprop::GradStore};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use std::{
    fmt::Debug,
    sync::{Mutex, MutexGuard},
};

pub struct OptimizerWithMaxGrad {
    optimizer: AdamW,
    max_grad_norm: Option<f32>,
    vars: Vec<Var>,
    updates: u64,
}

impl Debug for OptimizerWithMaxGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerWithMaxGrad")
            .field("learning_rate", &self.optimizer.learning_rate())
            .field("max_grad_norm", &self.max_grad_norm)
            .field("updates", &self.updates)
            .finish()
    }
}

impl OptimizerWithMaxGrad {
    /// Plain Adam: AdamW without weight decay.
    pub fn adam(vars: Vec<Var>, lr: f64, max_grad_norm: Option<f32>) -> Result<Self> {
        let params = ParamsAdamW {
            lr,
            weight_decay: 0.,
            ..Default::default()
        };
        let optimizer = AdamW::new(vars.clone(), params)?;
        Ok(Self {
            optimizer,
            max_grad_norm,
            vars,
            updates: 0,
        })
    }

    pub fn step(&mut self, grads: &mut GradStore) -> Result<()> {
        if let Some(max_norm) = self.max_grad_norm {
            clip_grad_norm(grads, &self.vars, max_norm)?;
        }
        self.optimizer.step(grads)?;
        self.updates += 1;
        Ok(())
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

/// The optimizer bound to the shared model. Every write to the shared weights goes through
/// the mutex, so holding [`SharedOptimizer::lock_updates`] freezes the weights.
#[derive(Debug)]
pub struct SharedOptimizer {
    inner: Mutex<OptimizerWithMaxGrad>,
}

impl SharedOptimizer {
    pub fn new(model: &SharedModel, lr: f64, max_grad_norm: Option<f32>) -> Result<Self> {
        let optimizer = OptimizerWithMaxGrad::adam(model.all_vars(), lr, max_grad_norm)?;
        Ok(Self {
            inner: Mutex::new(optimizer),
        })
    }

    pub fn lock_updates(&self) -> Result<MutexGuard<'_, OptimizerWithMaxGrad>> {
        Ok(self.inner.lock().map_err(|_| CheckpointError::Poisoned)?)
    }

    /// Applies gradients keyed by the shared model's variables.
    pub fn apply(&self, mut grads: GradStore) -> Result<()> {
        self.lock_updates()?.step(&mut grads)
    }

    pub fn updates(&self) -> Result<u64> {
        Ok(self.lock_updates()?.updates())
    }
}
