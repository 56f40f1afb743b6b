use anyhow::Result;
use candle_core::Tensor;

/// A single, unbatched observation: the chart window and the portfolio state.
#[derive(Debug, Clone)]
pub struct Observation {
    pub chart: Tensor,
    pub balance: Tensor,
}

pub struct SnapShot<T> {
    pub state: T,
    /// The action the environment actually took, which can differ from the requested one
    pub action: usize,
    pub reward: f32,
    pub terminated: bool,
    pub truncated: bool,
}

impl<T> SnapShot<T> {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentDescription {
    pub action_size: usize,
    /// Shape of the unbatched chart tensor
    pub chart_shape: Vec<usize>,
    pub balance_size: usize,
}

impl EnvironmentDescription {
    pub fn new(action_size: usize, chart_shape: Vec<usize>, balance_size: usize) -> Self {
        Self {
            action_size,
            chart_shape,
            balance_size,
        }
    }
}

pub trait Env {
    fn reset(&mut self) -> Result<Observation>;

    /// Takes the action with index `action`. `confidence` is the probability the policy
    /// assigned to it and scales the trade size.
    fn step(&mut self, action: usize, confidence: f32) -> Result<SnapShot<Observation>>;

    fn env_description(&self) -> EnvironmentDescription;

    fn portfolio_value(&self) -> f64;
}
