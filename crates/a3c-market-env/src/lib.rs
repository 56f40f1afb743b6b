pub mod market_data;
pub mod portfolio;
pub mod trading_env;

pub use market_data::{Candle, MarketData};
pub use portfolio::{Portfolio, TradingAction, TradingBounds};
pub use trading_env::{TradingConfig, TradingEnv};
