use a3c_candle_lm::{LocalModel, SharedModel, SharedOptimizer};
use a3c_core::{
    AgentConfig,
    env::{Env, EnvironmentDescription, Observation},
    stop::StopToken,
};
use anyhow::{Result, anyhow, bail};
use candle_core::{Error, Tensor};
use candle_nn::ops::{log_softmax, softmax};
use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnerParams {
    pub discount_factor: f32,
    pub t_max: usize,
    pub entropy_coef: f32,
    pub value_coef: f32,
}

impl From<&AgentConfig> for LearnerParams {
    fn from(config: &AgentConfig) -> Self {
        Self {
            discount_factor: config.discount_factor,
            t_max: config.t_max,
            entropy_coef: config.entropy_coef,
            value_coef: config.value_coef,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionSelection {
    Sample,
    Greedy,
    Random,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeSummary {
    pub steps: usize,
    pub total_reward: f32,
    pub portfolio_value: f64,
    pub num_buy: usize,
    pub num_sell: usize,
    pub num_hold: usize,
}

impl EpisodeSummary {
    // `action` is the one the environment executed, not the one requested
    fn record(&mut self, action: usize, reward: f32) {
        self.steps += 1;
        self.total_reward += reward;
        match action {
            0 => self.num_buy += 1,
            1 => self.num_sell += 1,
            _ => self.num_hold += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LearnerReport {
    pub id: usize,
    pub episodes: usize,
    pub updates: usize,
}

pub struct A3CLosses {
    pub policy_loss: Tensor,
    pub value_loss: Tensor,
    pub entropy: Tensor,
}

// one rollout segment, at most t_max steps
#[derive(Default)]
struct Segment {
    charts: Vec<Tensor>,
    balances: Vec<Tensor>,
    actions: Vec<u32>,
    rewards: Vec<f32>,
}

/// n-step discounted returns, bootstrapped from the value of the state after the segment.
pub fn discounted_returns(rewards: &[f32], bootstrap: f32, gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.; rewards.len()];
    let mut running = bootstrap;
    for (idx, reward) in rewards.iter().enumerate().rev() {
        running = reward + gamma * running;
        returns[idx] = running;
    }
    returns
}

/// A3C worker: runs its own environment, learns on a local copy of the network and pushes its
/// gradients to the shared model.
pub struct Learner<E: Env> {
    id: usize,
    env: E,
    model: Arc<SharedModel>,
    optimizer: Arc<SharedOptimizer>,
    local: LocalModel,
    params: LearnerParams,
    action_size: usize,
    stop: StopToken,
}

impl<E: Env> Learner<E> {
    pub fn new(
        id: usize,
        env: E,
        model: Arc<SharedModel>,
        optimizer: Arc<SharedOptimizer>,
        params: LearnerParams,
        stop: StopToken,
    ) -> Result<Self> {
        let description = env.env_description();
        let dims = model.dims();
        let expected = EnvironmentDescription::new(
            dims.action_size,
            model.kind().chart_shape(dims.n_steps, dims.chart_size),
            dims.balance_size,
        );
        if description != expected {
            bail!(
                "learner {id}: environment {description:?} does not fit the model {expected:?}"
            );
        }
        let action_size = description.action_size;
        let local = LocalModel::mirror(&model)?;
        Ok(Self {
            id,
            env,
            model,
            optimizer,
            local,
            params,
            action_size,
            stop,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn shared_model(&self) -> &Arc<SharedModel> {
        &self.model
    }

    pub fn shared_optimizer(&self) -> &Arc<SharedOptimizer> {
        &self.optimizer
    }

    /// Moves the learner onto its own thread, running [`Learner::run`].
    pub fn start(mut self) -> Result<LearnerHandle>
    where
        E: Send + 'static,
    {
        let id = self.id;
        let handle = thread::Builder::new()
            .name(format!("learner-{id}"))
            .spawn(move || {
                let result = self.run();
                if let Err(err) = &result {
                    error!(learner = id, "learner stopped: {err:#}");
                }
                result
            })?;
        Ok(LearnerHandle { id, handle })
    }

    /// Trains until the stop token fires.
    pub fn run(&mut self) -> Result<LearnerReport> {
        let mut report = LearnerReport {
            id: self.id,
            ..Default::default()
        };
        let mut state = self.env.reset()?;
        let mut episode = EpisodeSummary::default();
        while !self.stop.is_stopped() {
            let done = self.train_segment(&mut state, &mut episode)?;
            report.updates += 1;
            if done {
                report.episodes += 1;
                episode.portfolio_value = self.env.portfolio_value();
                self.log_episode("train", report.episodes, &episode);
                state = self.env.reset()?;
                episode = EpisodeSummary::default();
            }
        }
        Ok(report)
    }

    /// One greedy evaluation episode with the current shared weights.
    pub fn test(&mut self) -> Result<EpisodeSummary> {
        self.local.pull()?;
        let summary = self.run_episode(ActionSelection::Greedy)?;
        self.log_episode("test", 1, &summary);
        Ok(summary)
    }

    /// One episode of uniformly random actions, as a baseline.
    pub fn monkey(&mut self) -> Result<EpisodeSummary> {
        let summary = self.run_episode(ActionSelection::Random)?;
        self.log_episode("monkey", 1, &summary);
        Ok(summary)
    }

    fn run_episode(&mut self, selection: ActionSelection) -> Result<EpisodeSummary> {
        let mut summary = EpisodeSummary::default();
        let mut state = self.env.reset()?;
        while !self.stop.is_stopped() {
            let (action, confidence) = self.select_action(&state, selection)?;
            let snapshot = self.env.step(action, confidence)?;
            summary.record(snapshot.action, snapshot.reward);
            if snapshot.done() {
                break;
            }
            state = snapshot.state;
        }
        summary.portfolio_value = self.env.portfolio_value();
        Ok(summary)
    }

    fn log_episode(&self, mode: &str, episode: usize, summary: &EpisodeSummary) {
        info!(
            learner = self.id,
            mode,
            episode,
            steps = summary.steps,
            reward = summary.total_reward,
            portfolio_value = summary.portfolio_value,
            buys = summary.num_buy,
            sells = summary.num_sell,
            holds = summary.num_hold,
            "episode finished"
        );
    }

    /// Returns the action index and the probability the policy gave it.
    fn select_action(
        &self,
        state: &Observation,
        selection: ActionSelection,
    ) -> Result<(usize, f32)> {
        if selection == ActionSelection::Random {
            let mut rng = rand::rng();
            return Ok((rng.random_range(0..self.action_size), rng.random()));
        }
        let chart = state.chart.unsqueeze(0)?;
        let balance = state.balance.unsqueeze(0)?;
        let (logits, _) = self.local.forward(&chart, &balance)?;
        let probs: Vec<f32> = softmax(&logits.detach(), 1)?.squeeze(0)?.to_vec1()?;
        let action = match selection {
            ActionSelection::Greedy => probs
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(idx, _)| idx)
                .ok_or_else(|| anyhow!("policy produced no actions"))?,
            _ => WeightedIndex::new(&probs)
                .map_err(Error::wrap)?
                .sample(&mut rand::rng()),
        };
        Ok((action, probs[action]))
    }

    fn state_value(&self, state: &Observation) -> Result<f32> {
        let chart = state.chart.unsqueeze(0)?;
        let balance = state.balance.unsqueeze(0)?;
        let (_, values) = self.local.forward(&chart, &balance)?;
        Ok(values.squeeze(0)?.to_scalar::<f32>()?)
    }

    /// Pulls the shared weights, collects up to `t_max` steps and applies the resulting
    /// gradients to the shared model. Returns true when the episode ended.
    fn train_segment(
        &mut self,
        state: &mut Observation,
        episode: &mut EpisodeSummary,
    ) -> Result<bool> {
        self.local.pull()?;
        let mut segment = Segment::default();
        let mut done = false;
        for _ in 0..self.params.t_max {
            let (action, confidence) = self.select_action(state, ActionSelection::Sample)?;
            let snapshot = self.env.step(action, confidence)?;
            segment.charts.push(state.chart.clone());
            segment.balances.push(state.balance.clone());
            segment.actions.push(action as u32);
            segment.rewards.push(snapshot.reward);
            episode.record(snapshot.action, snapshot.reward);
            done = snapshot.done();
            *state = snapshot.state;
            if done || self.stop.is_stopped() {
                break;
            }
        }
        let bootstrap = if done { 0. } else { self.state_value(state)? };
        let returns = discounted_returns(&segment.rewards, bootstrap, self.params.discount_factor);
        let losses = self.losses(&segment, returns)?;
        let value_term = losses
            .value_loss
            .affine(self.params.value_coef as f64, 0.)?;
        let entropy_term = losses
            .entropy
            .affine(self.params.entropy_coef as f64, 0.)?;
        let loss = ((&losses.policy_loss + value_term)? - entropy_term)?;
        let grads = self.local.shared_grads(&loss)?;
        self.optimizer.apply(grads)?;
        let policy_loss = losses.policy_loss.to_scalar::<f32>()?;
        let value_loss = losses.value_loss.to_scalar::<f32>()?;
        debug!(
            learner = self.id,
            steps = segment.rewards.len(),
            policy_loss,
            value_loss,
            "segment applied"
        );
        Ok(done)
    }

    fn losses(&self, segment: &Segment, returns: Vec<f32>) -> Result<A3CLosses> {
        let device = self.model.device();
        let steps = segment.actions.len();
        let charts = Tensor::stack(&segment.charts, 0)?;
        let balances = Tensor::stack(&segment.balances, 0)?;
        let (logits, values) = self.local.forward(&charts, &balances)?;
        let log_probs = log_softmax(&logits, 1)?;
        let probs = softmax(&logits, 1)?;
        let actions = Tensor::from_slice(&segment.actions, (steps, 1), device)?;
        let action_log_probs = log_probs.gather(&actions, 1)?.squeeze(1)?;
        let returns = Tensor::from_vec(returns, steps, device)?;
        let advantages = returns.sub(&values)?;
        let policy_loss = action_log_probs
            .mul(&advantages.detach())?
            .neg()?
            .mean_all()?;
        let value_loss = advantages.sqr()?.mean_all()?;
        let entropy = probs.mul(&log_probs)?.sum(1)?.neg()?.mean_all()?;
        Ok(A3CLosses {
            policy_loss,
            value_loss,
            entropy,
        })
    }
}

pub struct LearnerHandle {
    id: usize,
    handle: JoinHandle<Result<LearnerReport>>,
}

impl LearnerHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> Result<LearnerReport> {
        self.handle
            .join()
            .map_err(|_| anyhow!("learner {} panicked", self.id))?
    }
}
