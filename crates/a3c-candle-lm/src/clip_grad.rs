use candle_core::{Result, Var, backprop::GradStore};

/// Rescales the gradients of `vars` in place so that their global L2 norm is at most
/// `max_norm`. Returns the norm before clipping.
pub fn clip_grad_norm(grads: &mut GradStore, vars: &[Var], max_norm: f32) -> Result<f32> {
    let mut total_norm_squared = 0.0f32;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = (max_norm / (total_norm + 1e-6)) as f64;
        for var in vars {
            if let Some(grad) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), grad.affine(clip_coef, 0.)?);
            }
        }
    }
    Ok(total_norm)
}
