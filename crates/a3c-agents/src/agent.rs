use crate::learner::{EpisodeSummary, Learner, LearnerHandle, LearnerParams, LearnerReport};
use a3c_candle_lm::{NetworkDims, SharedModel, SharedOptimizer};
use a3c_core::{
    AgentConfig, InputShape,
    stop::{StopToken, stop_channel},
};
use a3c_market_env::{MarketData, TradingConfig, TradingEnv};
use anyhow::Result;
use candle_core::Device;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{error, info};

#[derive(Debug)]
pub struct LearnerFailure {
    pub id: usize,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct TrainingSummary {
    pub checkpoints: usize,
    pub reports: Vec<LearnerReport>,
    pub failures: Vec<LearnerFailure>,
}

impl TrainingSummary {
    /// Joins the learner and files its outcome under `reports` or `failures`.
    pub fn record(&mut self, handle: LearnerHandle) {
        let id = handle.id();
        match handle.join() {
            Ok(report) => self.reports.push(report),
            Err(error) => {
                error!(learner = id, "learner failed: {error:#}");
                self.failures.push(LearnerFailure { id, error });
            }
        }
    }
}

/// Owns the shared model and optimizer and drives the learners in train, test and monkey
/// mode.
pub struct A3CAgent {
    config: AgentConfig,
    market: Arc<MarketData>,
    model: Arc<SharedModel>,
    optimizer: Arc<SharedOptimizer>,
    model_path: PathBuf,
    input_shapes: Vec<InputShape>,
    device: Device,
}

impl A3CAgent {
    /// Builds the shared network for `config.model`. With `reuse_model` set the weights are
    /// loaded from the model path, and a missing checkpoint is an error.
    pub fn new(config: AgentConfig, market: MarketData) -> Result<Self> {
        config.validate()?;
        market.validate_for(config.chart_size, config.window())?;
        let device = Device::Cpu;
        let model = SharedModel::build(config.model, NetworkDims::from(&config), &device)?;
        let optimizer = SharedOptimizer::new(&model, config.lr, config.max_grad_norm)?;
        let model_path = config.model_path();
        if config.reuse_model {
            model.load_weights(&model_path)?;
            info!(path = %model_path.display(), "reusing model weights");
        }
        Ok(Self {
            input_shapes: config.input_shapes(),
            market: Arc::new(market),
            model: Arc::new(model),
            optimizer: Arc::new(optimizer),
            model_path,
            config,
            device,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn input_shapes(&self) -> &[InputShape] {
        &self.input_shapes
    }

    pub fn model(&self) -> &Arc<SharedModel> {
        &self.model
    }

    pub fn optimizer(&self) -> &Arc<SharedOptimizer> {
        &self.optimizer
    }

    fn learner(&self, id: usize, stop: StopToken) -> Result<Learner<TradingEnv>> {
        let env = TradingEnv::new(
            self.market.clone(),
            TradingConfig::from(&self.config),
            &self.device,
        )?;
        Learner::new(
            id,
            env,
            self.model.clone(),
            self.optimizer.clone(),
            LearnerParams::from(&self.config),
            stop,
        )
    }

    /// The training pool: one learner per configured thread, all sharing this agent's model
    /// and optimizer.
    pub fn learners(&self, stop: &StopToken) -> Result<Vec<Learner<TradingEnv>>> {
        (0..self.config.threads)
            .map(|id| self.learner(id, stop.clone()))
            .collect()
    }

    /// Saves the shared weights to the model path. Updates are held off while writing.
    pub fn checkpoint(&self) -> Result<()> {
        let updates = self.optimizer.lock_updates()?;
        self.model.save_weights(&self.model_path)?;
        info!(
            path = %self.model_path.display(),
            updates = updates.updates(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// Starts the learner pool and checkpoints every `checkpoint_interval` until `stop` fires,
    /// then joins the learners and writes a last checkpoint. The learners are stopped and
    /// joined before any error is returned.
    pub fn train(&self, stop: StopToken) -> Result<TrainingSummary> {
        let (learners_stop, learners_token) = stop_channel();
        let learners = self.learners(&learners_token)?;
        let mut handles = Vec::with_capacity(learners.len());
        let mut summary = TrainingSummary::default();
        let result = self.run_schedule(learners, &mut handles, &stop, &mut summary);

        learners_stop.stop();
        for handle in handles {
            summary.record(handle);
        }
        result?;
        self.checkpoint()?;
        summary.checkpoints += 1;
        info!(
            checkpoints = summary.checkpoints,
            failed = summary.failures.len(),
            "training stopped"
        );
        Ok(summary)
    }

    fn run_schedule(
        &self,
        learners: Vec<Learner<TradingEnv>>,
        handles: &mut Vec<LearnerHandle>,
        stop: &StopToken,
        summary: &mut TrainingSummary,
    ) -> Result<()> {
        for (idx, learner) in learners.into_iter().enumerate() {
            info!("START WORKER #{idx}");
            handles.push(learner.start()?);
        }
        loop {
            self.checkpoint()?;
            summary.checkpoints += 1;
            let alive = handles.iter().filter(|h| !h.is_finished()).count();
            if alive < handles.len() {
                error!(alive, total = handles.len(), "some learners have stopped");
            }
            if stop.wait_timeout(self.config.checkpoint_interval) {
                return Ok(());
            }
        }
    }

    /// One greedy evaluation episode with the current weights.
    pub fn test(&self) -> Result<EpisodeSummary> {
        let mut learner = self.learner(0, StopToken::never())?;
        info!("START TEST");
        learner.test()
    }

    /// One random-action episode, as a baseline for `test`.
    pub fn monkey(&self) -> Result<EpisodeSummary> {
        let mut learner = self.learner(0, StopToken::never())?;
        info!("START MONKEY");
        learner.monkey()
    }
}
