use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;

use super::units::{to_base_units, UnitsError, NATIVE_DECIMALS};

/// A funded wallet that takes part in every snipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletInfo {
    /// Zero-based position in the configured key list
    pub index: usize,
    pub address: Address,
    /// Native amount spent per buy (wei)
    pub buy_amount_wei: U256,
}

impl WalletInfo {
    pub fn new(
        index: usize,
        address: Address,
        buy_amount_bnb: Decimal,
    ) -> Result<Self, UnitsError> {
        Ok(Self {
            index,
            address,
            buy_amount_wei: to_base_units(buy_amount_bnb, NATIVE_DECIMALS)?,
        })
    }

    /// One-based label used in logs
    pub fn label(&self) -> usize {
        self.index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wallet_buy_amount() {
        let wallet = WalletInfo::new(0, Address::ZERO, dec!(0.25)).unwrap();
        assert_eq!(
            wallet.buy_amount_wei,
            U256::from(250_000_000_000_000_000u128)
        );
        assert_eq!(wallet.label(), 1);
    }
}
