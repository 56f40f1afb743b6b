use a3c_core::{AgentConfig, ModelKind};
use candle_core::{IndexOp, Result, Tensor};
use candle_nn::{LSTM, LSTMConfig, Linear, Module, RNN, VarBuilder, linear, lstm};
use enum_dispatch::enum_dispatch;

const CHART_HIDDEN: usize = 64;
const BALANCE_HIDDEN: usize = 16;
const TRUNK_HIDDEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkDims {
    pub n_steps: usize,
    pub chart_size: usize,
    pub balance_size: usize,
    pub action_size: usize,
}

impl From<&AgentConfig> for NetworkDims {
    fn from(config: &AgentConfig) -> Self {
        Self {
            n_steps: config.n_steps,
            chart_size: config.chart_size,
            balance_size: config.balance_size,
            action_size: config.action_size,
        }
    }
}

#[enum_dispatch]
pub trait ActorCritic {
    /// Batched forward pass returning the policy logits `[batch, actions]` and the state
    /// values `[batch]`.
    fn forward(&self, chart: &Tensor, balance: &Tensor) -> Result<(Tensor, Tensor)>;
}

// balance branch, shared trunk and the two heads
#[derive(Debug, Clone)]
struct ActorCriticHead {
    balance_fc: Linear,
    trunk_fc: Linear,
    policy: Linear,
    value: Linear,
}

impl ActorCriticHead {
    fn new(chart_features: usize, dims: &NetworkDims, vb: &VarBuilder) -> Result<Self> {
        Ok(Self {
            balance_fc: linear(dims.balance_size, BALANCE_HIDDEN, vb.pp("balance_fc"))?,
            trunk_fc: linear(
                chart_features + BALANCE_HIDDEN,
                TRUNK_HIDDEN,
                vb.pp("trunk_fc"),
            )?,
            policy: linear(TRUNK_HIDDEN, dims.action_size, vb.pp("policy"))?,
            value: linear(TRUNK_HIDDEN, 1, vb.pp("value"))?,
        })
    }

    fn forward(&self, chart_features: &Tensor, balance: &Tensor) -> Result<(Tensor, Tensor)> {
        let balance = self.balance_fc.forward(balance)?.relu()?;
        let hidden = Tensor::cat(&[chart_features, &balance], 1)?;
        let hidden = self.trunk_fc.forward(&hidden)?.relu()?;
        let logits = self.policy.forward(&hidden)?;
        let values = self.value.forward(&hidden)?.squeeze(1)?;
        Ok((logits, values))
    }
}

#[derive(Debug, Clone)]
pub struct DnnActorCritic {
    chart_fc: Linear,
    head: ActorCriticHead,
}

impl DnnActorCritic {
    pub fn new(dims: &NetworkDims, vb: &VarBuilder) -> Result<Self> {
        Ok(Self {
            chart_fc: linear(dims.chart_size, CHART_HIDDEN, vb.pp("chart_fc"))?,
            head: ActorCriticHead::new(CHART_HIDDEN, dims, vb)?,
        })
    }
}

impl ActorCritic for DnnActorCritic {
    fn forward(&self, chart: &Tensor, balance: &Tensor) -> Result<(Tensor, Tensor)> {
        let chart = self.chart_fc.forward(chart)?.relu()?;
        self.head.forward(&chart, balance)
    }
}

#[derive(Debug, Clone)]
pub struct LstmDnnActorCritic {
    chart_lstm: LSTM,
    head: ActorCriticHead,
}

impl LstmDnnActorCritic {
    pub fn new(dims: &NetworkDims, vb: &VarBuilder) -> Result<Self> {
        Ok(Self {
            chart_lstm: lstm(
                dims.chart_size,
                CHART_HIDDEN,
                LSTMConfig::default(),
                vb.pp("chart_lstm"),
            )?,
            head: ActorCriticHead::new(CHART_HIDDEN, dims, vb)?,
        })
    }
}

impl ActorCritic for LstmDnnActorCritic {
    fn forward(&self, chart: &Tensor, balance: &Tensor) -> Result<(Tensor, Tensor)> {
        let (batch, seq_len, _) = chart.dims3()?;
        let mut state = self.chart_lstm.zero_state(batch)?;
        for t in 0..seq_len {
            let input = chart.i((.., t, ..))?.contiguous()?;
            state = self.chart_lstm.step(&input, &state)?;
        }
        self.head.forward(state.h(), balance)
    }
}

#[enum_dispatch(ActorCritic)]
#[derive(Debug, Clone)]
pub enum ActorCriticNet {
    Dnn(DnnActorCritic),
    LstmDnn(LstmDnnActorCritic),
}

impl ActorCriticNet {
    pub fn build(kind: ModelKind, dims: &NetworkDims, vb: &VarBuilder) -> Result<Self> {
        match kind {
            ModelKind::Dnn => Ok(Self::Dnn(DnnActorCritic::new(dims, vb)?)),
            ModelKind::LstmDnn => Ok(Self::LstmDnn(LstmDnnActorCritic::new(dims, vb)?)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    const DIMS: NetworkDims = NetworkDims {
        n_steps: 5,
        chart_size: 10,
        balance_size: 2,
        action_size: 3,
    };

    #[test]
    fn dnn_output_shapes() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = ActorCriticNet::build(ModelKind::Dnn, &DIMS, &vb)?;
        let chart = Tensor::zeros((4, 10), DType::F32, &device)?;
        let balance = Tensor::zeros((4, 2), DType::F32, &device)?;
        let (logits, values) = net.forward(&chart, &balance)?;
        assert_eq!(logits.dims(), &[4, 3]);
        assert_eq!(values.dims(), &[4]);
        Ok(())
    }

    #[test]
    fn lstm_dnn_output_shapes() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let net = ActorCriticNet::build(ModelKind::LstmDnn, &DIMS, &vb)?;
        let chart = Tensor::ones((2, 5, 10), DType::F32, &device)?;
        let balance = Tensor::ones((2, 2), DType::F32, &device)?;
        let (logits, values) = net.forward(&chart, &balance)?;
        assert_eq!(logits.dims(), &[2, 3]);
        assert_eq!(values.dims(), &[2]);
        assert!(
            varmap
                .data()
                .lock()
                .unwrap()
                .keys()
                .any(|name| name.starts_with("chart_lstm"))
        );
        Ok(())
    }
}
