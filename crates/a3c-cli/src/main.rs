use a3c_agents::A3CAgent;
use a3c_core::{AgentConfig, ModelKind, stop::stop_channel};
use a3c_market_env::MarketData;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{path::PathBuf, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Train from freshly initialized weights.
    Train,
    /// Continue training from the saved checkpoint.
    Update,
    /// Run one greedy episode with the saved checkpoint.
    Test,
    /// Run one random-action episode.
    Monkey,
}

#[derive(Parser, Debug)]
#[command(name = "a3c-trader", about = "A3C trainer for a single-stock trading agent")]
struct Args {
    #[arg(long, value_enum, default_value = "train")]
    mode: Mode,

    /// Market data JSON for one instrument.
    #[arg(long)]
    data: PathBuf,

    /// Instrument code, defaults to the code in the data file.
    #[arg(long)]
    code: Option<String>,

    #[arg(long, default_value = "DNN")]
    model: ModelKind,

    #[arg(long, default_value_t = 1)]
    n_steps: usize,

    #[arg(long, default_value_t = 3)]
    action_size: usize,

    #[arg(long, default_value_t = 2)]
    balance_size: usize,

    #[arg(long, default_value_t = 1e-4)]
    lr: f64,

    #[arg(long, default_value_t = 0.99)]
    discount_factor: f32,

    #[arg(long, default_value_t = 16)]
    threads: usize,

    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    #[arg(long, default_value_t = 1800)]
    checkpoint_interval_secs: u64,

    #[arg(long, default_value_t = 100_000_000.)]
    initial_balance: f64,

    #[arg(long, default_value_t = 100_000.)]
    min_trading_price: f64,

    #[arg(long, default_value_t = 1_000_000.)]
    max_trading_price: f64,
}

impl Args {
    fn agent_config(&self, market: &MarketData) -> AgentConfig {
        AgentConfig {
            code: self
                .code
                .clone()
                .unwrap_or_else(|| market.code().to_string()),
            model: self.model,
            n_steps: self.n_steps,
            chart_size: market.chart_size(),
            balance_size: self.balance_size,
            action_size: self.action_size,
            reuse_model: matches!(self.mode, Mode::Update | Mode::Test),
            initial_balance: self.initial_balance,
            min_trading_price: self.min_trading_price,
            max_trading_price: self.max_trading_price,
            lr: self.lr,
            discount_factor: self.discount_factor,
            threads: self.threads,
            base_dir: self.base_dir.clone(),
            checkpoint_interval: Duration::from_secs(self.checkpoint_interval_secs),
            ..Default::default()
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let market = MarketData::from_json_path(&args.data)
        .with_context(|| format!("loading market data from {}", args.data.display()))?;
    let config = args.agent_config(&market);
    info!(
        mode = ?args.mode,
        code = %config.code,
        model = %config.model,
        days = market.len(),
        "starting"
    );
    let agent = A3CAgent::new(config, market)?;
    match args.mode {
        Mode::Train | Mode::Update => {
            // runs until the process is killed
            let (_source, stop) = stop_channel();
            let summary = agent.train(stop)?;
            info!(checkpoints = summary.checkpoints, "training finished");
        }
        Mode::Test => {
            let summary = agent.test()?;
            info!(
                portfolio_value = summary.portfolio_value,
                reward = summary.total_reward,
                "test finished"
            );
        }
        Mode::Monkey => {
            let summary = agent.monkey()?;
            info!(
                portfolio_value = summary.portfolio_value,
                reward = summary.total_reward,
                "monkey finished"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn update_and_test_reuse_the_checkpoint() -> Result<()> {
        let market = MarketData::new("005930", vec![1., 2.], vec![vec![0.; 7], vec![0.; 7]])?;
        for (mode, reuse) in [
            ("train", false),
            ("update", true),
            ("test", true),
            ("monkey", false),
        ] {
            let args = Args::try_parse_from([
                "a3c-trader",
                "--mode",
                mode,
                "--data",
                "market.json",
                "--model",
                "LSTMDNN",
                "--n-steps",
                "5",
            ])?;
            let config = args.agent_config(&market);
            assert_eq!(config.reuse_model, reuse, "{mode}");
            assert_eq!(config.model, ModelKind::LstmDnn);
            assert_eq!(config.chart_size, 7);
            assert_eq!(config.code, "005930");
        }
        Ok(())
    }

    #[test]
    fn unknown_model_is_rejected() {
        let args = Args::try_parse_from(["a3c-trader", "--data", "m.json", "--model", "CNN"]);
        assert!(args.is_err());
    }
}
