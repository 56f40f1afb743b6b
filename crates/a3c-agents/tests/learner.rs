use a3c_agents::{Learner, LearnerParams, TrainingSummary};
use a3c_candle_lm::{NetworkDims, SharedModel, SharedOptimizer};
use a3c_core::{
    AgentConfig, ModelKind,
    env::{Env, EnvironmentDescription, Observation, SnapShot},
    stop::{StopToken, stop_channel},
};
use a3c_market_env::{MarketData, TradingConfig, TradingEnv};
use anyhow::{Result, bail};
use candle_core::Device;
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

// trades normally, then errors once `steps_left` runs out
struct FlakyEnv {
    inner: TradingEnv,
    steps_left: usize,
}

impl Env for FlakyEnv {
    fn reset(&mut self) -> Result<Observation> {
        self.inner.reset()
    }

    fn step(&mut self, action: usize, confidence: f32) -> Result<SnapShot<Observation>> {
        if self.steps_left == 0 {
            bail!("market feed dropped");
        }
        self.steps_left -= 1;
        self.inner.step(action, confidence)
    }

    fn env_description(&self) -> EnvironmentDescription {
        self.inner.env_description()
    }

    fn portfolio_value(&self) -> f64 {
        self.inner.portfolio_value()
    }
}

struct Pool {
    config: AgentConfig,
    data: Arc<MarketData>,
    model: Arc<SharedModel>,
    optimizer: Arc<SharedOptimizer>,
}

impl Pool {
    fn new() -> Result<Self> {
        let config = AgentConfig {
            model: ModelKind::Dnn,
            chart_size: 4,
            t_max: 5,
            initial_balance: 1_000_000.,
            min_trading_price: 1_000.,
            max_trading_price: 10_000.,
            ..Default::default()
        };
        let prices = (0..20).map(|day| 100. + (day as f64).sin() * 10.).collect();
        let features = (0..20).map(|day| vec![(day as f32).cos(); 4]).collect();
        let data = Arc::new(MarketData::new("TEST", prices, features)?);
        let model = Arc::new(SharedModel::build(
            config.model,
            NetworkDims::from(&config),
            &Device::Cpu,
        )?);
        let optimizer = Arc::new(SharedOptimizer::new(&model, config.lr, config.max_grad_norm)?);
        Ok(Self {
            config,
            data,
            model,
            optimizer,
        })
    }

    fn env(&self) -> Result<TradingEnv> {
        TradingEnv::new(
            self.data.clone(),
            TradingConfig::from(&self.config),
            &Device::Cpu,
        )
    }

    fn learner<E: Env>(&self, id: usize, env: E, stop: &StopToken) -> Result<Learner<E>> {
        Learner::new(
            id,
            env,
            self.model.clone(),
            self.optimizer.clone(),
            LearnerParams::from(&self.config),
            stop.clone(),
        )
    }
}

#[test]
fn failed_learner_is_reported_and_others_keep_training() -> Result<()> {
    let pool = Pool::new()?;
    let (source, stop) = stop_channel();
    let flaky = FlakyEnv {
        inner: pool.env()?,
        steps_left: 12,
    };
    let failing = pool.learner(0, flaky, &stop)?.start()?;
    let healthy = pool.learner(1, pool.env()?, &stop)?.start()?;

    let deadline = Instant::now() + Duration::from_secs(30);
    while !failing.is_finished() {
        assert!(Instant::now() < deadline, "learner 0 never failed");
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!healthy.is_finished());
    let updates = pool.optimizer.updates()?;
    while pool.optimizer.updates()? == updates {
        assert!(Instant::now() < deadline, "learner 1 stopped training");
        thread::sleep(Duration::from_millis(5));
    }

    source.stop();
    let mut summary = TrainingSummary::default();
    summary.record(failing);
    summary.record(healthy);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].id, 0);
    assert!(format!("{:#}", summary.failures[0].error).contains("market feed dropped"));
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].id, 1);
    assert!(summary.reports[0].updates > 0);
    Ok(())
}
