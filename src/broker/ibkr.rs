//! Interactive Brokers commission schedule.

use super::{Broker, Side};

/// IBKR's two commission schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IbkrTier {
    /// `$0.005/share`, `$1.00` minimum, no clearing/pass-through fees.
    Fixed,
    /// `$0.0035/share`, `$0.35` minimum, plus clearing and NYSE/FINRA pass-throughs.
    Tiered,
}

impl IbkrTier {
    fn per_share_and_min_fee(self) -> (f64, f64) {
        match self {
            IbkrTier::Fixed => (0.005, 1.00),
            IbkrTier::Tiered => (0.0035, 0.35),
        }
    }
}

/// Interactive Brokers fee policy (fixed or tiered schedule), with optional slippage.
#[derive(Debug, Clone, Copy)]
pub struct IbkrBroker {
    tier: IbkrTier,
    slippage: f64,
}

impl IbkrBroker {
    /// Construct with no slippage.
    pub fn new(tier: IbkrTier) -> Self {
        Self { tier, slippage: 0.0 }
    }

    /// Construct with a per-notional slippage fraction.
    pub fn with_slippage(tier: IbkrTier, slippage: f64) -> Self {
        Self { tier, slippage }
    }
}

impl Broker for IbkrBroker {
    fn calculate_fees(&self, qty: u64, price: f64, side: Side) -> f64 {
        let qty_f = qty as f64;
        let notional = qty_f * price;
        let (per_share, min_fee) = self.tier.per_share_and_min_fee();

        let raw_commission = qty_f * per_share;
        let commission = raw_commission.max(min_fee).min(notional * 0.01);

        let mut fee = commission;

        if side == Side::Sell {
            fee += qty_f * 0.000166; // FINRA TAF
            fee += qty_f * 0.000022; // FINRA CAT
        }

        if self.tier == IbkrTier::Tiered {
            fee += qty_f * 0.00020; // clearing
            fee += commission * 0.000175; // NYSE pass-through
            fee += commission * 0.00056; // FINRA pass-through
        }

        fee += notional * self.slippage;

        fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_commission_clamped_to_minimum() {
        let broker = IbkrBroker::new(IbkrTier::Fixed);
        // 10 shares * $0.005 = $0.05, clamped up to the $1.00 minimum.
        let fee = broker.calculate_fees(10, 50.0, Side::Buy);
        assert!((fee - 1.00).abs() < 1e-9);
    }

    #[test]
    fn fixed_commission_clamped_to_one_percent_notional() {
        let broker = IbkrBroker::new(IbkrTier::Fixed);
        // raw = 100000*0.005 = 500; notional*0.01 = 100000*1000*0.01 = 1,000,000, so
        // raw wins: max(500, 1.00) = 500, min(500, 1,000,000) = 500.
        let fee = broker.calculate_fees(100_000, 1000.0, Side::Buy);
        assert!((fee - 500.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_commission_small_notional_caps_below_minimum() {
        // notional = 50, so the 1%-of-notional cap (0.50) is below the $1.00
        // minimum: max(0.005, 1.00) = 1.00, min(1.00, 0.50) = 0.50. Must not panic.
        let broker = IbkrBroker::new(IbkrTier::Fixed);
        let fee = broker.calculate_fees(1, 50.0, Side::Buy);
        assert!((fee - 0.50).abs() < 1e-9);
    }

    #[test]
    fn tiered_fee_includes_clearing_and_pass_throughs() {
        // qty=100, price=50, side=buy.
        // commission = max(0.35, min(100*0.0035, 5000*0.01)) = max(0.35, min(0.35, 50)) = 0.35
        // + clearing 100*0.00020 = 0.02
        // + pass-throughs on commission: 0.35 * (0.000175 + 0.00056)
        let broker = IbkrBroker::new(IbkrTier::Tiered);
        let fee = broker.calculate_fees(100, 50.0, Side::Buy);
        let expected = 0.35 + 0.02 + 0.35 * (0.000175 + 0.00056);
        assert!((fee - expected).abs() < 1e-6, "got {fee}, expected {expected}");
    }

    #[test]
    fn sell_adds_finra_taf_and_cat() {
        let broker = IbkrBroker::new(IbkrTier::Fixed);
        let buy_fee = broker.calculate_fees(1000, 50.0, Side::Buy);
        let sell_fee = broker.calculate_fees(1000, 50.0, Side::Sell);
        let expected_extra = 1000.0 * (0.000166 + 0.000022);
        assert!((sell_fee - buy_fee - expected_extra).abs() < 1e-9);
    }

    #[test]
    fn slippage_scales_with_notional() {
        let broker = IbkrBroker::with_slippage(IbkrTier::Fixed, 0.001);
        let without = IbkrBroker::new(IbkrTier::Fixed).calculate_fees(1000, 50.0, Side::Buy);
        let with = broker.calculate_fees(1000, 50.0, Side::Buy);
        assert!((with - without - 1000.0 * 50.0 * 0.001).abs() < 1e-9);
    }
}
