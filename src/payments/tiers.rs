//! Investment tier table

use serde::Serialize;

/// Fixed (amount -> daily payout, referral bonus) mapping, in naira
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentTier {
    pub amount: f64,
    pub daily: f64,
    pub referral_bonus: f64,
}

const fn tier(amount: f64, daily: f64, referral_bonus: f64) -> InvestmentTier {
    InvestmentTier {
        amount,
        daily,
        referral_bonus,
    }
}

/// Ascending by amount
pub const TIERS: &[InvestmentTier] = &[
    tier(3_000.0, 150.0, 300.0),
    tier(5_000.0, 250.0, 500.0),
    tier(10_000.0, 500.0, 1_000.0),
    tier(20_000.0, 1_000.0, 2_000.0),
    tier(50_000.0, 2_500.0, 5_000.0),
    tier(100_000.0, 5_000.0, 10_000.0),
    tier(200_000.0, 10_000.0, 20_000.0),
];

/// Highest tier whose amount does not exceed the payment
pub fn tier_for(amount: f64) -> Option<&'static InvestmentTier> {
    TIERS.iter().rev().find(|t| t.amount <= amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_ascending() {
        assert!(TIERS.windows(2).all(|w| w[0].amount < w[1].amount));
    }

    #[test]
    fn exact_amounts_hit_their_tier() {
        let t = tier_for(10_000.0).unwrap();
        assert_eq!(t.daily, 500.0);
        assert_eq!(t.referral_bonus, 1_000.0);
    }

    #[test]
    fn in_between_amounts_round_down() {
        assert_eq!(tier_for(7_500.0).unwrap().amount, 5_000.0);
        assert_eq!(tier_for(1_000_000.0).unwrap().amount, 200_000.0);
    }

    #[test]
    fn below_smallest_tier_has_no_accrual() {
        assert!(tier_for(2_999.99).is_none());
        assert!(tier_for(0.0).is_none());
    }
}
