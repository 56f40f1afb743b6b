use crate::{
    market_data::MarketData,
    portfolio::{Portfolio, TradingAction, TradingBounds},
};
use a3c_core::{
    AgentConfig, ModelKind,
    env::{Env, EnvironmentDescription, Observation, SnapShot},
};
use anyhow::{Result, bail};
use candle_core::{Device, Tensor};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct TradingConfig {
    pub model: ModelKind,
    pub n_steps: usize,
    pub chart_size: usize,
    pub balance_size: usize,
    pub action_size: usize,
    pub initial_balance: f64,
    pub bounds: TradingBounds,
}

impl From<&AgentConfig> for TradingConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            model: config.model,
            n_steps: config.n_steps,
            chart_size: config.chart_size,
            balance_size: config.balance_size,
            action_size: config.action_size,
            initial_balance: config.initial_balance,
            bounds: TradingBounds {
                min_trading_price: config.min_trading_price,
                max_trading_price: config.max_trading_price,
            },
        }
    }
}

impl TradingConfig {
    fn window(&self) -> usize {
        self.model.window(self.n_steps)
    }

    fn chart_shape(&self) -> Vec<usize> {
        self.model.chart_shape(self.n_steps, self.chart_size)
    }
}

/// Trades a single instrument over the whole market data, one day per step. Each learner owns
/// its own environment, the market data itself is shared.
pub struct TradingEnv {
    data: Arc<MarketData>,
    config: TradingConfig,
    portfolio: Portfolio,
    day: usize,
    last_value: f64,
    device: Device,
}

impl TradingEnv {
    pub fn new(data: Arc<MarketData>, config: TradingConfig, device: &Device) -> Result<Self> {
        data.validate_for(config.chart_size, config.window())?;
        let portfolio = Portfolio::new(config.initial_balance);
        Ok(Self {
            day: config.window() - 1,
            last_value: config.initial_balance,
            data,
            config,
            portfolio,
            device: device.clone(),
        })
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn day(&self) -> usize {
        self.day
    }

    fn observation(&self) -> Result<Observation> {
        let chart = self.data.window(self.day, self.config.window());
        let chart = Tensor::from_vec(chart, self.config.chart_shape(), &self.device)?;
        let features = self.portfolio.features(self.data.price(self.day));
        let balance = Tensor::from_slice(
            &features[..self.config.balance_size],
            self.config.balance_size,
            &self.device,
        )?;
        Ok(Observation { chart, balance })
    }
}

impl Env for TradingEnv {
    fn reset(&mut self) -> Result<Observation> {
        self.portfolio = Portfolio::new(self.config.initial_balance);
        self.day = self.config.window() - 1;
        self.last_value = self.config.initial_balance;
        self.observation()
    }

    fn step(&mut self, action: usize, confidence: f32) -> Result<SnapShot<Observation>> {
        if self.day + 1 >= self.data.len() {
            bail!("episode is over at day {}, reset the environment", self.day);
        }
        let price = self.data.price(self.day);
        let (executed, _) = self.portfolio.execute(
            TradingAction::from_index(action),
            &self.config.bounds,
            confidence,
            price,
        );
        self.day += 1;
        let value = self.portfolio.value(self.data.price(self.day));
        let reward = ((value - self.last_value) / self.last_value) as f32;
        self.last_value = value;
        Ok(SnapShot {
            state: self.observation()?,
            action: executed.index(),
            reward,
            terminated: self.day + 1 == self.data.len(),
            truncated: false,
        })
    }

    fn env_description(&self) -> EnvironmentDescription {
        EnvironmentDescription::new(
            self.config.action_size,
            self.config.chart_shape(),
            self.config.balance_size,
        )
    }

    fn portfolio_value(&self) -> f64 {
        self.portfolio.value(self.data.price(self.day))
    }
}
