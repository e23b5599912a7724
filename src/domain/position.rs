//! Position model and exit arithmetic
//!
//! A position is one wallet's open exposure to one token. All amounts are
//! kept in on-chain smallest units (`U256`) so trigger checks never drift.

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use std::fmt;

/// Composite identity of a position: one wallet, one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    pub wallet_index: usize,
    pub token: Address,
}

impl PositionKey {
    pub fn new(wallet_index: usize, token: Address) -> Self {
        Self { wallet_index, token }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wallet {}/{}", self.wallet_index + 1, self.token)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub key: PositionKey,
    /// Native value of the holding at acquisition (wei)
    pub reference_price: U256,
    /// Last observed token balance
    pub balance: U256,
    /// Balance at acquisition, never modified
    pub initial_balance: U256,
    pub sold: bool,
    pub approved: bool,
    pub take_profit_done: bool,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(key: PositionKey, reference_price: U256, balance: U256) -> Self {
        Self {
            key,
            reference_price,
            balance,
            initial_balance: balance,
            sold: false,
            approved: false,
            take_profit_done: false,
            opened_at: Utc::now(),
        }
    }

    pub fn token(&self) -> Address {
        self.key.token
    }

    pub fn wallet_index(&self) -> usize {
        self.key.wallet_index
    }

    /// Loss of `current_price` against the reference, in whole percent.
    pub fn drop_percent(&self, current_price: U256) -> u64 {
        drop_percent(self.reference_price, current_price)
    }

    /// Amount the take-profit rule sells, capped at what is held.
    pub fn take_profit_amount(&self, sell_percent: u8) -> U256 {
        take_profit_amount(self.initial_balance, self.balance, sell_percent)
    }

    /// Account for a partial sell that went through. The reference price
    /// stays at the acquisition value.
    pub fn apply_partial_sell(&mut self, sold_amount: U256) {
        self.balance = self.balance.saturating_sub(sold_amount);
    }
}

/// `max(0, (reference - current) * 100 / reference)`; zero when reference is zero.
pub fn drop_percent(reference: U256, current: U256) -> u64 {
    if reference.is_zero() || current >= reference {
        return 0;
    }

    let diff = reference - current;
    let pct = match diff.checked_mul(U256::from(100u64)) {
        Some(scaled) => scaled / reference,
        // only reachable for amounts near 2^256
        None => diff / (reference / U256::from(100u64)),
    };

    u64::try_from(pct).unwrap_or(100)
}

/// `min(initial * percent / 100, balance)`
pub fn take_profit_amount(initial: U256, balance: U256, sell_percent: u8) -> U256 {
    let target = scale(initial, U256::from(sell_percent), U256::from(100u64));
    target.min(balance)
}

/// `value * numerator / denominator` without overflowing the intermediate product.
fn scale(value: U256, numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    match value.checked_mul(numerator) {
        Some(product) => product / denominator,
        None => value / denominator * numerator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const TOKEN: Address = address!("00000000000000000000000000000000000000aa");

    fn position(reference: u64, balance: u64) -> Position {
        Position::new(
            PositionKey::new(0, TOKEN),
            U256::from(reference),
            U256::from(balance),
        )
    }

    #[test]
    fn test_new_position_flags() {
        let pos = position(100, 1000);
        assert!(!pos.sold);
        assert!(!pos.approved);
        assert!(!pos.take_profit_done);
        assert_eq!(pos.initial_balance, U256::from(1000u64));
    }

    #[test]
    fn test_drop_percent_basic() {
        assert_eq!(drop_percent(U256::from(100u64), U256::from(75u64)), 25);
        assert_eq!(drop_percent(U256::from(100u64), U256::from(80u64)), 20);
        assert_eq!(drop_percent(U256::from(100u64), U256::from(81u64)), 19);
    }

    #[test]
    fn test_drop_percent_price_up_is_zero() {
        assert_eq!(drop_percent(U256::from(100u64), U256::from(150u64)), 0);
        assert_eq!(drop_percent(U256::from(100u64), U256::from(100u64)), 0);
    }

    #[test]
    fn test_drop_percent_zero_reference() {
        assert_eq!(drop_percent(U256::ZERO, U256::ZERO), 0);
        assert_eq!(drop_percent(U256::ZERO, U256::from(5u64)), 0);
    }

    #[test]
    fn test_drop_percent_total_loss() {
        assert_eq!(drop_percent(U256::from(100u64), U256::ZERO), 100);
    }

    #[test]
    fn test_drop_percent_huge_values() {
        let reference = U256::MAX;
        let current = U256::MAX / U256::from(2u64);
        assert_eq!(drop_percent(reference, current), 50);
    }

    #[test]
    fn test_take_profit_amount_uses_initial() {
        let amount = take_profit_amount(U256::from(1000u64), U256::from(1000u64), 70);
        assert_eq!(amount, U256::from(700u64));
    }

    #[test]
    fn test_take_profit_amount_capped_at_balance() {
        let amount = take_profit_amount(U256::from(1000u64), U256::from(500u64), 70);
        assert_eq!(amount, U256::from(500u64));
    }

    #[test]
    fn test_apply_partial_sell_keeps_reference() {
        let mut pos = position(100, 1000);
        pos.apply_partial_sell(U256::from(700u64));

        assert_eq!(pos.balance, U256::from(300u64));
        assert_eq!(pos.reference_price, U256::from(100u64));
        assert_eq!(pos.initial_balance, U256::from(1000u64));
    }

    #[test]
    fn test_apply_partial_sell_never_underflows() {
        let mut pos = position(100, 10);
        pos.apply_partial_sell(U256::from(50u64));
        assert_eq!(pos.balance, U256::ZERO);
        assert_eq!(pos.reference_price, U256::from(100u64));
    }

    #[test]
    fn test_key_display() {
        let key = PositionKey::new(2, TOKEN);
        assert!(key.to_string().starts_with("wallet 3/"));
    }
}
