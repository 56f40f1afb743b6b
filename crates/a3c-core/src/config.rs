use crate::error::ConfigError;
use derive_more::Display;
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// Number of portfolio features the trading environment can report.
pub const BALANCE_FEATURES: usize = 3;

/// A model input shape, `None` standing for the batch dimension.
pub type InputShape = Vec<Option<usize>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ModelKind {
    /// Feed forward network over a single day of chart features
    #[display("DNN")]
    Dnn,
    /// LSTM over the last `n_steps` days of chart features
    #[display("LSTMDNN")]
    LstmDnn,
}

impl FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DNN" => Ok(Self::Dnn),
            "LSTMDNN" => Ok(Self::LstmDnn),
            other => Err(ConfigError::UnknownModel(other.to_owned())),
        }
    }
}

impl ModelKind {
    pub fn input_shapes(
        &self,
        n_steps: usize,
        chart_size: usize,
        balance_size: usize,
    ) -> Vec<InputShape> {
        let chart = match self {
            Self::Dnn => vec![None, Some(chart_size)],
            Self::LstmDnn => vec![None, Some(n_steps), Some(chart_size)],
        };
        vec![chart, vec![None, Some(balance_size)]]
    }

    /// `<base>/model/<kind>/<kind>`, suffixed with `_<n_steps>` for sequence models.
    pub fn checkpoint_path(&self, base_dir: &Path, n_steps: usize) -> PathBuf {
        let name = self.to_string();
        let file_name = match self {
            Self::Dnn => name.clone(),
            Self::LstmDnn => format!("{name}_{n_steps}"),
        };
        base_dir.join("model").join(name).join(file_name)
    }

    /// Shape of one unbatched chart observation.
    pub fn chart_shape(&self, n_steps: usize, chart_size: usize) -> Vec<usize> {
        match self {
            Self::Dnn => vec![chart_size],
            Self::LstmDnn => vec![n_steps, chart_size],
        }
    }

    /// Number of days a single observation spans.
    pub fn window(&self, n_steps: usize) -> usize {
        match self {
            Self::Dnn => 1,
            Self::LstmDnn => n_steps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub code: String,
    pub model: ModelKind,
    pub n_steps: usize,
    pub chart_size: usize,
    pub balance_size: usize,
    pub action_size: usize,
    pub reuse_model: bool,
    pub initial_balance: f64,
    pub min_trading_price: f64,
    pub max_trading_price: f64,
    pub lr: f64,
    pub discount_factor: f32,
    pub threads: usize,
    pub base_dir: PathBuf,
    pub checkpoint_interval: Duration,
    // learner hyperparameters
    pub t_max: usize,
    pub entropy_coef: f32,
    pub value_coef: f32,
    pub max_grad_norm: Option<f32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            code: String::new(),
            model: ModelKind::Dnn,
            n_steps: 1,
            chart_size: 10,
            balance_size: 2,
            action_size: 3,
            reuse_model: false,
            initial_balance: 100_000_000.,
            min_trading_price: 100_000.,
            max_trading_price: 1_000_000.,
            lr: 1e-4,
            discount_factor: 0.99,
            threads: 16,
            base_dir: PathBuf::from("."),
            checkpoint_interval: Duration::from_secs(60 * 30),
            t_max: 20,
            entropy_coef: 0.01,
            value_coef: 0.5,
            max_grad_norm: Some(40.),
        }
    }
}

impl AgentConfig {
    pub fn model_path(&self) -> PathBuf {
        self.model.checkpoint_path(&self.base_dir, self.n_steps)
    }

    pub fn input_shapes(&self) -> Vec<InputShape> {
        self.model
            .input_shapes(self.n_steps, self.chart_size, self.balance_size)
    }

    /// Days covered by one chart observation.
    pub fn window(&self) -> usize {
        self.model.window(self.n_steps)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("threads", self.threads),
            ("n_steps", self.n_steps),
            ("chart_size", self.chart_size),
            ("t_max", self.t_max),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(ConfigError::NotPositive {
                    field,
                    value: value as f64,
                });
            }
        }
        let amounts = [
            ("initial_balance", self.initial_balance),
            ("min_trading_price", self.min_trading_price),
            ("max_trading_price", self.max_trading_price),
            ("lr", self.lr),
            (
                "checkpoint_interval",
                self.checkpoint_interval.as_secs_f64(),
            ),
        ];
        for (field, value) in amounts {
            if value.is_nan() || value <= 0. {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if self.balance_size == 0 || self.balance_size > BALANCE_FEATURES {
            return Err(ConfigError::BalanceSize {
                value: self.balance_size,
                max: BALANCE_FEATURES,
            });
        }
        if self.action_size < 2 {
            return Err(ConfigError::ActionSize(self.action_size));
        }
        if self.min_trading_price > self.max_trading_price {
            return Err(ConfigError::TradingBounds {
                min: self.min_trading_price,
                max: self.max_trading_price,
            });
        }
        if !(self.discount_factor > 0. && self.discount_factor <= 1.) {
            return Err(ConfigError::DiscountFactor(self.discount_factor));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dnn_shapes_and_path() {
        let config = AgentConfig {
            model: ModelKind::Dnn,
            action_size: 3,
            chart_size: 10,
            balance_size: 2,
            base_dir: PathBuf::from("/base"),
            ..Default::default()
        };
        assert_eq!(
            config.input_shapes(),
            vec![vec![None, Some(10)], vec![None, Some(2)]]
        );
        assert_eq!(config.model_path(), PathBuf::from("/base/model/DNN/DNN"));
    }

    #[test]
    fn lstm_dnn_shapes_and_path() {
        let config = AgentConfig {
            model: ModelKind::LstmDnn,
            n_steps: 5,
            action_size: 3,
            chart_size: 10,
            balance_size: 2,
            base_dir: PathBuf::from("/base"),
            ..Default::default()
        };
        assert_eq!(
            config.input_shapes(),
            vec![vec![None, Some(5), Some(10)], vec![None, Some(2)]]
        );
        assert_eq!(
            config.model_path(),
            PathBuf::from("/base/model/LSTMDNN/LSTMDNN_5")
        );
    }

    #[test]
    fn model_kind_parsing() {
        assert_eq!("DNN".parse::<ModelKind>().unwrap(), ModelKind::Dnn);
        assert_eq!("LSTMDNN".parse::<ModelKind>().unwrap(), ModelKind::LstmDnn);
        assert!(matches!(
            "CNN".parse::<ModelKind>(),
            Err(ConfigError::UnknownModel(name)) if name == "CNN"
        ));
        assert_eq!(ModelKind::LstmDnn.to_string(), "LSTMDNN");
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(AgentConfig::default().validate().is_ok());
        let zero_threads = AgentConfig {
            threads: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_threads.validate(),
            Err(ConfigError::NotPositive { field: "threads", .. })
        ));
        let inverted = AgentConfig {
            min_trading_price: 10.,
            max_trading_price: 1.,
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::TradingBounds { .. })
        ));
        let wide_balance = AgentConfig {
            balance_size: 4,
            ..Default::default()
        };
        assert!(wide_balance.validate().is_err());
        let no_discount = AgentConfig {
            discount_factor: 0.,
            ..Default::default()
        };
        assert!(no_discount.validate().is_err());
    }
}
