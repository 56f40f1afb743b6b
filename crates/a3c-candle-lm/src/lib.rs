pub mod clip_grad;
pub mod local_model;
pub mod network;
pub mod optimizer;
pub mod shared_model;

pub use local_model::LocalModel;
pub use network::{ActorCritic, ActorCriticNet, NetworkDims};
pub use optimizer::SharedOptimizer;
pub use shared_model::SharedModel;
