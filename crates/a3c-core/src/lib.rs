pub mod config;
pub mod env;
pub mod error;
pub mod stop;

pub use config::{AgentConfig, InputShape, ModelKind};
pub use error::{CheckpointError, ConfigError, MarketDataError};
