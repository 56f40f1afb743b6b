use a3c_core::config::BALANCE_FEATURES;
use derive_more::Display;

/// Broker commission charged on both buys and sells.
pub const COMMISSION_RATE: f64 = 0.00015;
/// Transaction tax charged on sells.
pub const TAX_RATE: f64 = 0.0025;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TradingAction {
    #[display("buy")]
    Buy,
    #[display("sell")]
    Sell,
    #[display("hold")]
    Hold,
}

impl TradingAction {
    pub fn from_index(action: usize) -> Self {
        match action {
            0 => Self::Buy,
            1 => Self::Sell,
            _ => Self::Hold,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
            Self::Hold => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradingBounds {
    pub min_trading_price: f64,
    pub max_trading_price: f64,
}

impl TradingBounds {
    /// Number of shares worth between the min and max trading price, scaled by `confidence`.
    /// Always at least one share.
    pub fn trading_unit(&self, confidence: f32, price: f64) -> u64 {
        let confidence = f64::from(confidence).clamp(0., 1.);
        let budget = self.min_trading_price
            + confidence * (self.max_trading_price - self.min_trading_price);
        ((budget / price).floor() as u64).max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    initial_balance: f64,
    balance: f64,
    num_stocks: u64,
    avg_buy_price: f64,
    pub num_buy: usize,
    pub num_sell: usize,
    pub num_hold: usize,
}

impl Portfolio {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            num_stocks: 0,
            avg_buy_price: 0.,
            num_buy: 0,
            num_sell: 0,
            num_hold: 0,
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn num_stocks(&self) -> u64 {
        self.num_stocks
    }

    pub fn avg_buy_price(&self) -> f64 {
        self.avg_buy_price
    }

    pub fn value(&self, price: f64) -> f64 {
        self.balance + self.num_stocks as f64 * price
    }

    /// Executes `action` at `price`. A trade that cannot be executed (no cash, no shares) is
    /// recorded as a hold. Returns the action actually taken and the number of shares moved.
    pub fn execute(
        &mut self,
        action: TradingAction,
        bounds: &TradingBounds,
        confidence: f32,
        price: f64,
    ) -> (TradingAction, u64) {
        let unit = bounds.trading_unit(confidence, price);
        let executed = match action {
            TradingAction::Buy => self.buy(unit, price),
            TradingAction::Sell => self.sell(unit, price),
            TradingAction::Hold => 0,
        };
        if executed == 0 {
            self.num_hold += 1;
            (TradingAction::Hold, 0)
        } else {
            (action, executed)
        }
    }

    fn buy(&mut self, unit: u64, price: f64) -> u64 {
        let unit_cost = price * (1. + COMMISSION_RATE);
        let affordable = (self.balance / unit_cost).floor() as u64;
        let shares = unit.min(affordable);
        if shares == 0 {
            return 0;
        }
        self.balance -= unit_cost * shares as f64;
        let held = self.num_stocks as f64;
        self.avg_buy_price =
            (self.avg_buy_price * held + price * shares as f64) / (held + shares as f64);
        self.num_stocks += shares;
        self.num_buy += 1;
        shares
    }

    fn sell(&mut self, unit: u64, price: f64) -> u64 {
        let shares = unit.min(self.num_stocks);
        if shares == 0 {
            return 0;
        }
        self.balance += price * (1. - COMMISSION_RATE - TAX_RATE) * shares as f64;
        self.num_stocks -= shares;
        if self.num_stocks == 0 {
            self.avg_buy_price = 0.;
        }
        self.num_sell += 1;
        shares
    }

    /// `[stock ratio, profit/loss ratio, price relative to the average buy price]`
    pub fn features(&self, price: f64) -> [f32; BALANCE_FEATURES] {
        let value = self.value(price);
        let stock_ratio = self.num_stocks as f64 * price / value;
        let profit_loss = value / self.initial_balance - 1.;
        let avg_buy_ratio = if self.num_stocks > 0 {
            price / self.avg_buy_price - 1.
        } else {
            0.
        };
        [stock_ratio as f32, profit_loss as f32, avg_buy_ratio as f32]
    }
}
