use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown model kind `{0}`, expected one of DNN, LSTMDNN")]
    UnknownModel(String),
    #[error("`{field}` must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("`balance_size` must be between 1 and {max}, got {value}")]
    BalanceSize { value: usize, max: usize },
    #[error("`action_size` must be at least 2, got {0}")]
    ActionSize(usize),
    #[error("min trading price {min} is above max trading price {max}")]
    TradingBounds { min: f64, max: f64 },
    #[error("discount factor must be in (0, 1], got {0}")]
    DiscountFactor(f32),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("no checkpoint found at {0}")]
    Missing(PathBuf),
    #[error("checkpoint {path} has no tensor named `{name}`")]
    MissingTensor { path: PathBuf, name: String },
    #[error("model lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("market data is empty")]
    Empty,
    #[error("{prices} close prices but {rows} feature rows")]
    LengthMismatch { prices: usize, rows: usize },
    #[error("feature row {row} has {found} columns, expected {expected}")]
    FeatureWidth {
        row: usize,
        found: usize,
        expected: usize,
    },
    #[error("close price on day {day} is not positive: {price}")]
    InvalidPrice { day: usize, price: f64 },
    #[error("need at least {needed} days for a {n_steps}-step window, got {days}")]
    TooShort {
        days: usize,
        needed: usize,
        n_steps: usize,
    },
}
