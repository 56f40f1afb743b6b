use a3c_core::{MarketDataError, ModelKind, env::Env};
use a3c_market_env::{MarketData, TradingBounds, TradingConfig, TradingEnv};
use anyhow::Result;
use candle_core::Device;
use std::sync::Arc;

fn rising_market(days: usize, chart_size: usize) -> MarketData {
    let prices = (0..days).map(|day| 100. + day as f64).collect();
    let features = (0..days)
        .map(|day| vec![day as f32; chart_size])
        .collect();
    MarketData::new("TEST", prices, features).unwrap()
}

fn config(model: ModelKind, n_steps: usize) -> TradingConfig {
    TradingConfig {
        model,
        n_steps,
        chart_size: 4,
        balance_size: 2,
        action_size: 3,
        initial_balance: 100_000.,
        bounds: TradingBounds {
            min_trading_price: 1_000.,
            max_trading_price: 10_000.,
        },
    }
}

#[test]
fn dnn_episode_covers_every_day() -> Result<()> {
    let data = Arc::new(rising_market(10, 4));
    let mut env = TradingEnv::new(data, config(ModelKind::Dnn, 1), &Device::Cpu)?;
    let description = env.env_description();
    assert_eq!(description.chart_shape, vec![4]);
    assert_eq!(description.balance_size, 2);

    let state = env.reset()?;
    assert_eq!(state.chart.dims(), &[4]);
    assert_eq!(state.balance.dims(), &[2]);

    let mut steps = 0;
    let mut total_reward = 0.;
    loop {
        // always buy in a rising market
        let snapshot = env.step(0, 1.)?;
        steps += 1;
        total_reward += snapshot.reward;
        if snapshot.done() {
            break;
        }
    }
    assert_eq!(steps, 9);
    assert!(total_reward > 0.);
    assert!(env.portfolio_value() > 100_000.);
    assert!(env.portfolio().num_buy > 0);
    // stepping past the last day is an error until reset
    assert!(env.step(2, 1.).is_err());
    env.reset()?;
    assert_eq!(env.portfolio_value(), 100_000.);
    Ok(())
}

#[test]
fn lstm_observation_is_a_window() -> Result<()> {
    let data = Arc::new(rising_market(8, 4));
    let mut env = TradingEnv::new(data, config(ModelKind::LstmDnn, 3), &Device::Cpu)?;
    let state = env.reset()?;
    assert_eq!(state.chart.dims(), &[3, 4]);
    // the window ends on the current day
    let rows: Vec<Vec<f32>> = state.chart.to_vec2()?;
    assert_eq!(rows[0][0], 0.);
    assert_eq!(rows[2][0], 2.);
    assert_eq!(env.day(), 2);

    let snapshot = env.step(2, 0.)?;
    let rows: Vec<Vec<f32>> = snapshot.state.chart.to_vec2()?;
    assert_eq!(rows[2][0], 3.);
    assert_eq!(snapshot.reward, 0.);
    Ok(())
}

#[test]
fn rejects_data_that_does_not_fit() {
    let data = Arc::new(rising_market(3, 4));
    let too_short = TradingEnv::new(data.clone(), config(ModelKind::LstmDnn, 3), &Device::Cpu);
    assert!(matches!(
        too_short.err().and_then(|e| e.downcast::<MarketDataError>().ok()),
        Some(MarketDataError::TooShort { .. })
    ));
    let mut wide = config(ModelKind::Dnn, 1);
    wide.chart_size = 5;
    assert!(TradingEnv::new(data, wide, &Device::Cpu).is_err());
}

#[test]
fn market_data_from_json() -> Result<()> {
    let json = r#"{
        "code": "005930",
        "candles": [
            {"date": "20240102", "close": 100.0, "features": [0.1, 0.2]},
            {"date": "20240103", "close": 101.5, "features": [0.3, 0.4]}
        ]
    }"#;
    let data = MarketData::from_json_str(json)?;
    assert_eq!(data.code(), "005930");
    assert_eq!(data.len(), 2);
    assert_eq!(data.chart_size(), 2);
    assert_eq!(data.date(1), "20240103");
    assert_eq!(data.window(1, 2), vec![0.1, 0.2, 0.3, 0.4]);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("market.json");
    std::fs::write(&path, json)?;
    assert_eq!(MarketData::from_json_path(&path)?.price(1), 101.5);
    Ok(())
}

#[test]
fn market_data_validation() {
    assert!(matches!(
        MarketData::new("X", vec![], vec![]),
        Err(MarketDataError::Empty)
    ));
    assert!(matches!(
        MarketData::new("X", vec![1., 2.], vec![vec![0.]]),
        Err(MarketDataError::LengthMismatch { .. })
    ));
    assert!(matches!(
        MarketData::new("X", vec![1., 0.], vec![vec![0.], vec![0.]]),
        Err(MarketDataError::InvalidPrice { day: 1, .. })
    ));
    assert!(matches!(
        MarketData::new("X", vec![1., 2.], vec![vec![0.], vec![0., 1.]]),
        Err(MarketDataError::FeatureWidth { row: 1, .. })
    ));
}

#[test]
fn unaffordable_trades_are_reported_as_holds() -> Result<()> {
    let data = Arc::new(rising_market(6, 4));
    let mut broke = config(ModelKind::Dnn, 1);
    broke.initial_balance = 1.;
    let mut env = TradingEnv::new(data, broke, &Device::Cpu)?;
    env.reset()?;
    // no cash to buy, no shares to sell
    assert_eq!(env.step(0, 1.)?.action, 2);
    assert_eq!(env.step(1, 1.)?.action, 2);
    assert_eq!(env.portfolio().num_hold, 2);

    let data = Arc::new(rising_market(6, 4));
    let mut env = TradingEnv::new(data, config(ModelKind::Dnn, 1), &Device::Cpu)?;
    env.reset()?;
    assert_eq!(env.step(0, 1.)?.action, 0);
    assert_eq!(env.step(1, 1.)?.action, 1);
    Ok(())
}
