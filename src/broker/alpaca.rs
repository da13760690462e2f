//! Alpaca's zero-commission + regulatory-fee schedule.

use super::{Broker, Side};

/// Alpaca fee policy: zero commission, regulatory fees only, with optional slippage.
#[derive(Debug, Clone, Copy)]
pub struct AlpacaBroker {
    slippage: f64,
}

impl AlpacaBroker {
    /// Construct with no slippage.
    pub fn new() -> Self {
        Self { slippage: 0.0 }
    }

    /// Construct with a per-notional slippage fraction.
    pub fn with_slippage(slippage: f64) -> Self {
        Self { slippage }
    }
}

impl Default for AlpacaBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker for AlpacaBroker {
    fn calculate_fees(&self, qty: u64, price: f64, side: Side) -> f64 {
        let qty_f = qty as f64;
        let notional = qty_f * price;

        let mut fee = 0.0;

        if side == Side::Sell {
            let taf = (qty_f.min(50_205.0) * 0.000195).min(9.79);
            fee += (taf * 100.0).ceil() / 100.0;
        }

        fee += qty_f * 0.0000265; // FINRA CAT, all executions

        fee += notional * self.slippage;

        fee
    }
}
