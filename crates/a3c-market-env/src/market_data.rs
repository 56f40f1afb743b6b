use a3c_core::MarketDataError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: String,
    pub close: f64,
    pub features: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarketDataFile {
    code: String,
    candles: Vec<Candle>,
}

/// Daily close prices together with the (already preprocessed) chart features of each day.
#[derive(Debug, Clone)]
pub struct MarketData {
    code: String,
    dates: Vec<String>,
    prices: Vec<f64>,
    features: Vec<Vec<f32>>,
}

impl MarketData {
    pub fn new(
        code: impl Into<String>,
        prices: Vec<f64>,
        features: Vec<Vec<f32>>,
    ) -> std::result::Result<Self, MarketDataError> {
        let dates = (0..prices.len()).map(|day| day.to_string()).collect();
        Self::with_dates(code.into(), dates, prices, features)
    }

    fn with_dates(
        code: String,
        dates: Vec<String>,
        prices: Vec<f64>,
        features: Vec<Vec<f32>>,
    ) -> std::result::Result<Self, MarketDataError> {
        if prices.is_empty() {
            return Err(MarketDataError::Empty);
        }
        if prices.len() != features.len() {
            return Err(MarketDataError::LengthMismatch {
                prices: prices.len(),
                rows: features.len(),
            });
        }
        if let Some((day, price)) = prices
            .iter()
            .enumerate()
            .find(|(_, price)| !(**price > 0.))
        {
            return Err(MarketDataError::InvalidPrice { day, price: *price });
        }
        let expected = features[0].len();
        if let Some((row, found)) = features
            .iter()
            .map(Vec::len)
            .enumerate()
            .find(|(_, width)| *width != expected)
        {
            return Err(MarketDataError::FeatureWidth {
                row,
                found,
                expected,
            });
        }
        Ok(Self {
            code,
            dates,
            prices,
            features,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: MarketDataFile = serde_json::from_str(json).context("parsing market data")?;
        let mut dates = Vec::with_capacity(file.candles.len());
        let mut prices = Vec::with_capacity(file.candles.len());
        let mut features = Vec::with_capacity(file.candles.len());
        for candle in file.candles {
            dates.push(candle.date);
            prices.push(candle.close);
            features.push(candle.features);
        }
        Ok(Self::with_dates(file.code, dates, prices, features)?)
    }

    pub fn from_json_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading market data {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("loading {}", path.display()))
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn chart_size(&self) -> usize {
        self.features[0].len()
    }

    pub fn date(&self, day: usize) -> &str {
        &self.dates[day]
    }

    pub fn price(&self, day: usize) -> f64 {
        self.prices[day]
    }

    /// Feature rows of the `window` days ending at `day`, flattened.
    pub fn window(&self, day: usize, window: usize) -> Vec<f32> {
        self.features[day + 1 - window..=day].concat()
    }

    /// Checks the data fits a model reading `chart_size` features over `window` days. At least
    /// one step must be possible after the first full window.
    pub fn validate_for(
        &self,
        chart_size: usize,
        window: usize,
    ) -> std::result::Result<(), MarketDataError> {
        if self.chart_size() != chart_size {
            return Err(MarketDataError::FeatureWidth {
                row: 0,
                found: self.chart_size(),
                expected: chart_size,
            });
        }
        let needed = window + 1;
        if self.len() < needed {
            return Err(MarketDataError::TooShort {
                days: self.len(),
                needed,
                n_steps: window,
            });
        }
        Ok(())
    }
}
